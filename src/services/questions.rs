use crate::db::SurveyStore;
use crate::domain::models::{NewQuestion, Question};
use crate::error::{ApiError, ApiResult};

pub async fn create(store: &dyn SurveyStore, payload: NewQuestion) -> ApiResult<Question> {
    payload.validate()?;
    let question = store.create_question(&payload).await?;
    tracing::info!(
        "Question created: id={}, options={}",
        question.id,
        question.options.len()
    );
    Ok(question)
}

pub async fn list(store: &dyn SurveyStore) -> ApiResult<Vec<Question>> {
    Ok(store.list_questions().await?)
}

pub async fn get(store: &dyn SurveyStore, id: i32) -> ApiResult<Question> {
    store
        .get_question(id)
        .await?
        .ok_or(ApiError::NotFound("Question"))
}

/// Replace semantics: new text, and every option is reissued with a fresh id.
pub async fn update(store: &dyn SurveyStore, id: i32, payload: NewQuestion) -> ApiResult<Question> {
    payload.validate()?;
    let question = store
        .replace_question(id, &payload)
        .await?
        .ok_or(ApiError::NotFound("Question"))?;
    tracing::info!(
        "Question updated: id={}, options={}",
        question.id,
        question.options.len()
    );
    Ok(question)
}

pub async fn delete(store: &dyn SurveyStore, id: i32) -> ApiResult<()> {
    if !store.delete_question(id).await? {
        return Err(ApiError::NotFound("Question"));
    }
    tracing::info!("Question deleted: id={}", id);
    Ok(())
}
