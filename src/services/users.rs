use crate::db::SurveyStore;
use crate::domain::models::{User, UserResponse};
use crate::domain::scoring::{self, SubscaleScore};
use crate::error::{ApiError, ApiResult};

pub async fn list(store: &dyn SurveyStore) -> ApiResult<Vec<User>> {
    Ok(store.list_users().await?)
}

pub async fn get(store: &dyn SurveyStore, id: i32) -> ApiResult<User> {
    store.get_user(id).await?.ok_or(ApiError::NotFound("User"))
}

/// Responses with their question attached. An unknown user simply has none.
pub async fn responses(store: &dyn SurveyStore, user_id: i32) -> ApiResult<Vec<UserResponse>> {
    Ok(store.user_responses(user_id).await?)
}

/// Raw and normalized score of every subscale for one user.
pub async fn scores(store: &dyn SurveyStore, user_id: i32) -> ApiResult<Vec<SubscaleScore>> {
    let user = get(store, user_id).await?;
    let responses = store.user_responses(user_id).await?;

    let mut out = Vec::new();
    for subscale in store.list_subscales().await? {
        let table = store.normalization_table(subscale.id).await?;
        out.push(scoring::score_subscale(&user, &responses, &subscale, &table));
    }
    Ok(out)
}
