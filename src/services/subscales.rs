use crate::db::SurveyStore;
use crate::domain::models::{NewSubscale, NormalizationEntry, Subscale, SubscalePatch};
use crate::domain::normalization;
use crate::error::{ApiError, ApiResult};

pub async fn list(store: &dyn SurveyStore) -> ApiResult<Vec<Subscale>> {
    Ok(store.list_subscales().await?)
}

pub async fn get(store: &dyn SurveyStore, id: i32) -> ApiResult<Subscale> {
    store
        .get_subscale(id)
        .await?
        .ok_or(ApiError::NotFound("Subscale"))
}

pub async fn create(
    store: &dyn SurveyStore,
    enforce_references: bool,
    payload: NewSubscale,
) -> ApiResult<Subscale> {
    payload.validate()?;
    let subscale = store.create_subscale(&payload, enforce_references).await?;
    tracing::info!(
        "Subscale created: id={}, method={}, questions={}",
        subscale.id,
        subscale.method,
        subscale.question_ids.len()
    );
    Ok(subscale)
}

/// Every field is overwritten; `question_ids` falls back to empty when omitted.
pub async fn replace_all(
    store: &dyn SurveyStore,
    enforce_references: bool,
    id: i32,
    payload: NewSubscale,
) -> ApiResult<Subscale> {
    payload.validate()?;
    apply(store, enforce_references, id, SubscalePatch::from(payload)).await
}

/// Only the supplied fields are overwritten.
pub async fn patch_fields(
    store: &dyn SurveyStore,
    enforce_references: bool,
    id: i32,
    patch: SubscalePatch,
) -> ApiResult<Subscale> {
    patch.validate()?;
    apply(store, enforce_references, id, patch).await
}

async fn apply(
    store: &dyn SurveyStore,
    enforce_references: bool,
    id: i32,
    patch: SubscalePatch,
) -> ApiResult<Subscale> {
    let subscale = store
        .update_subscale(id, &patch, enforce_references)
        .await?
        .ok_or(ApiError::NotFound("Subscale"))?;
    tracing::info!("Subscale updated: id={}", subscale.id);
    Ok(subscale)
}

pub async fn delete(store: &dyn SurveyStore, id: i32) -> ApiResult<()> {
    if !store.delete_subscale(id).await? {
        return Err(ApiError::NotFound("Subscale"));
    }
    tracing::info!("Subscale deleted: id={}", id);
    Ok(())
}

/// An uploaded table file as received at the request boundary.
#[derive(Debug, Clone, Default)]
pub struct TableUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Replaces the subscale's normalization table with the uploaded file.
///
/// The file is fully parsed before storage is touched; a bad row leaves the
/// previous table in place. Returns the number of rows stored.
pub async fn upload_normalization_table(
    store: &dyn SurveyStore,
    subscale_id: i32,
    upload: TableUpload,
) -> ApiResult<usize> {
    if !normalization::is_delimited_text(upload.file_name.as_deref(), upload.content_type.as_deref())
    {
        return Err(ApiError::UnsupportedMediaType(
            "normalization table must be a .csv file".to_string(),
        ));
    }
    if store.get_subscale(subscale_id).await?.is_none() {
        return Err(ApiError::NotFound("Subscale"));
    }

    let rows = normalization::parse_table(&upload.bytes).map_err(|e| {
        tracing::warn!(
            "Rejected normalization upload for subscale {}: {}",
            subscale_id,
            e
        );
        e
    })?;
    let stored = store.replace_normalization_table(subscale_id, &rows).await?;
    tracing::info!(
        "Normalization table replaced: subscale_id={}, rows={}",
        subscale_id,
        stored
    );
    Ok(stored)
}

pub async fn normalization_table(
    store: &dyn SurveyStore,
    subscale_id: i32,
) -> ApiResult<Vec<NormalizationEntry>> {
    Ok(store.normalization_table(subscale_id).await?)
}
