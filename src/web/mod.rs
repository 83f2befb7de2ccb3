pub mod questions;
pub mod submission;
pub mod subscales;
pub mod users;

use crate::config::CorsOrigins;
use crate::error::ApiError;
use crate::state::SharedState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

async fn health() -> &'static str {
    "OK"
}

/// JSON body extractor whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// Path extractor with the same error shape, e.g. for a non-numeric id.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(questions::router(state.clone()))
        .merge(submission::router(state.clone()))
        .merge(subscales::router(state.clone()))
        .merge(users::router(state))
}

/// Full application: routes plus the CORS and tracing layers.
pub fn app(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        CorsOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        }
    }
}
