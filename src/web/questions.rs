use crate::domain::models::{NewQuestion, Question};
use crate::error::ApiResult;
use crate::services::questions;
use crate::state::SharedState;
use crate::web::{ApiJson, ApiPath};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/questions", get(list_questions).post(create_question))
        .route("/questions/", get(list_questions).post(create_question))
        .route(
            "/questions/:id",
            get(get_question)
                .patch(update_question)
                .delete(delete_question),
        )
        .with_state(state)
}

async fn create_question(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<NewQuestion>,
) -> ApiResult<Json<Question>> {
    let question = questions::create(state.store.as_ref(), payload).await?;
    Ok(Json(question))
}

async fn list_questions(State(state): State<SharedState>) -> ApiResult<Json<Vec<Question>>> {
    Ok(Json(questions::list(state.store.as_ref()).await?))
}

async fn get_question(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Question>> {
    Ok(Json(questions::get(state.store.as_ref(), id).await?))
}

async fn update_question(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<NewQuestion>,
) -> ApiResult<Json<Question>> {
    Ok(Json(questions::update(state.store.as_ref(), id, payload).await?))
}

async fn delete_question(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Value>> {
    questions::delete(state.store.as_ref(), id).await?;
    Ok(Json(json!({ "message": "Question deleted" })))
}
