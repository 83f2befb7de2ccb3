use crate::domain::models::Submission;
use crate::error::ApiResult;
use crate::services::submissions;
use crate::state::SharedState;
use crate::web::ApiJson;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/submit", post(submit_form))
        .route("/submit/", post(submit_form))
        .with_state(state)
}

async fn submit_form(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<Submission>,
) -> ApiResult<Json<Value>> {
    let user = submissions::submit(
        state.store.as_ref(),
        state.config.enforce_references,
        payload,
    )
    .await?;
    Ok(Json(json!({
        "message": "Submission saved!",
        "user_id": user.id,
    })))
}
