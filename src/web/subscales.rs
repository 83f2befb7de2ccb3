use crate::domain::models::{NewSubscale, NormalizationEntry, Subscale, SubscalePatch};
use crate::error::{ApiError, ApiResult};
use crate::services::subscales::{self, TableUpload};
use crate::state::SharedState;
use crate::web::{ApiJson, ApiPath};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    let upload = post(upload_normalization)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .route("/subscales", get(list_subscales).post(create_subscale))
        .route("/subscales/", get(list_subscales).post(create_subscale))
        .route(
            "/subscales/:id",
            get(get_subscale)
                .put(replace_subscale)
                .patch(patch_subscale)
                .delete(delete_subscale),
        )
        .route("/subscales/:id/upload-normalization", upload.clone())
        .route("/subscales/:id/upload-normalization/", upload)
        .route("/subscales/:id/normalization-table", get(get_normalization_table))
        .route("/subscales/:id/normalization-table/", get(get_normalization_table))
        .with_state(state)
}

async fn list_subscales(State(state): State<SharedState>) -> ApiResult<Json<Vec<Subscale>>> {
    Ok(Json(subscales::list(state.store.as_ref()).await?))
}

async fn get_subscale(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Subscale>> {
    Ok(Json(subscales::get(state.store.as_ref(), id).await?))
}

async fn create_subscale(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<NewSubscale>,
) -> ApiResult<Json<Subscale>> {
    let subscale = subscales::create(
        state.store.as_ref(),
        state.config.enforce_references,
        payload,
    )
    .await?;
    Ok(Json(subscale))
}

async fn replace_subscale(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<NewSubscale>,
) -> ApiResult<Json<Subscale>> {
    let subscale = subscales::replace_all(
        state.store.as_ref(),
        state.config.enforce_references,
        id,
        payload,
    )
    .await?;
    Ok(Json(subscale))
}

async fn patch_subscale(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(patch): ApiJson<SubscalePatch>,
) -> ApiResult<Json<Subscale>> {
    let subscale = subscales::patch_fields(
        state.store.as_ref(),
        state.config.enforce_references,
        id,
        patch,
    )
    .await?;
    Ok(Json(subscale))
}

async fn delete_subscale(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<StatusCode> {
    subscales::delete(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Expects a multipart form with the table in a `file` field.
async fn upload_normalization(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart =
        multipart.map_err(|e| ApiError::UnsupportedMediaType(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(read_failure)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(read_failure)?;
        upload = Some(TableUpload { file_name, content_type, bytes: bytes.to_vec() });
        break;
    }

    let upload = upload.ok_or_else(|| {
        ApiError::UnsupportedMediaType("multipart field 'file' is required".to_string())
    })?;
    let rows = subscales::upload_normalization_table(state.store.as_ref(), id, upload).await?;

    Ok(Json(json!({
        "message": "Normalization table uploaded",
        "rows": rows,
    })))
}

/// Keeps axum's status, so a body over the upload limit is a 413.
fn read_failure(err: MultipartError) -> ApiError {
    ApiError::Rejected {
        status: err.status(),
        message: err.body_text(),
    }
}

async fn get_normalization_table(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<Vec<NormalizationEntry>>> {
    Ok(Json(subscales::normalization_table(state.store.as_ref(), id).await?))
}
