use crate::domain::models::{User, UserResponse};
use crate::domain::scoring::SubscaleScore;
use crate::error::ApiResult;
use crate::services::users;
use crate::state::SharedState;
use crate::web::ApiPath;
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/", get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/responses", get(get_user_responses))
        .route("/users/:id/scores", get(get_user_scores))
        .with_state(state)
}

async fn list_users(State(state): State<SharedState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(users::list(state.store.as_ref()).await?))
}

async fn get_user(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<User>> {
    Ok(Json(users::get(state.store.as_ref(), id).await?))
}

async fn get_user_responses(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    Ok(Json(users::responses(state.store.as_ref(), id).await?))
}

async fn get_user_scores(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Vec<SubscaleScore>>> {
    Ok(Json(users::scores(state.store.as_ref(), id).await?))
}
