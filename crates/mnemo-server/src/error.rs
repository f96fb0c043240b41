//! HTTP error mapping. Handlers return `Result<_, ApiError>`; the body is
//! always `{"error": ..., "message"?: ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use mnemo_core::errors::GatewayError;
use mnemo_engine::EngineError;
use mnemo_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Engine(EngineError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Engine(EngineError::Gateway(e)) if e.is_configuration() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Engine(EngineError::Gateway(_)) => StatusCode::BAD_GATEWAY,
            Self::Engine(EngineError::Store(e)) | Self::Store(e) => store_status(e),
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::BadRequest(m) | Self::Engine(EngineError::InvalidRequest(m)) => {
                json!({ "error": m })
            }
            Self::Engine(EngineError::Gateway(GatewayError::MissingApiKey(provider))) => {
                error!(%provider, "chat request without configured API key");
                json!({
                    "error": "Internal server error",
                    "message": "Server configuration error: API key not set",
                })
            }
            Self::Engine(EngineError::Gateway(e)) => {
                error!(error = %e, kind = e.error_kind(), "provider call failed");
                json!({ "error": "Internal server error", "message": e.to_string() })
            }
            Self::Engine(EngineError::Store(e)) | Self::Store(e) => {
                error!(error = %e, "store operation failed");
                json!({
                    "success": false,
                    "error": "Internal server error",
                    "message": e.to_string(),
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(EngineError::Gateway(GatewayError::MissingApiKey(
                "DeepSeek".into()
            )))
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(EngineError::Gateway(GatewayError::RateLimited {
                retry_after: None
            }))
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(EngineError::InvalidRequest("no messages".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("fts5".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StoreError::Database("locked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
