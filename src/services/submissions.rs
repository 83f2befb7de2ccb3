use crate::db::SurveyStore;
use crate::domain::models::{Submission, User};
use crate::error::ApiResult;

/// Persists one user and all of their responses as a single unit of work.
/// Answers and raw scores are stored as sent; nothing is scored here. With
/// `enforce_references`, an unknown question id rejects the whole submission.
pub async fn submit(
    store: &dyn SurveyStore,
    enforce_references: bool,
    payload: Submission,
) -> ApiResult<User> {
    payload.validate()?;
    let user = store
        .create_submission(&payload.user, &payload.responses, enforce_references)
        .await?;
    tracing::info!(
        "Submission saved: user_id={}, responses={}",
        user.id,
        payload.responses.len()
    );
    Ok(user)
}
