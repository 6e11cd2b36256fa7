use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use swipefeed_core::error::{SourceError, StoreError};
use swipefeed_core::infra::wire::{
    CODE_MALFORMED_RESPONSE, CODE_RATE_LIMITED, CODE_UPSTREAM_UNAVAILABLE, ErrorBody,
    ErrorEnvelope,
};

#[derive(Debug)]
pub struct ServerError {
    status: StatusCode,
    code: String,
    message: String,
    retry_after_secs: Option<u64>,
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let code = status_code_to_string(status);
        Self {
            status,
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_code(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            retry_after_secs,
            ..Self::with_code(
                StatusCode::TOO_MANY_REQUESTS,
                CODE_RATE_LIMITED,
                "too many requests",
            )
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        };
        let mut response = (self.status, axum::Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<SourceError> for ServerError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::RateLimited { retry_after_secs } => Self::rate_limited(retry_after_secs),
            SourceError::NotFound(name) => {
                Self::new(StatusCode::NOT_FOUND, format!("feed not found: {name}"))
            }
            SourceError::Malformed(msg) => {
                Self::with_code(StatusCode::BAD_GATEWAY, CODE_MALFORMED_RESPONSE, msg)
            }
            SourceError::Unavailable(msg) => {
                Self::with_code(StatusCode::BAD_GATEWAY, CODE_UPSTREAM_UNAVAILABLE, msg)
            }
        }
    }
}

pub fn map_store_error(err: StoreError) -> ServerError {
    match err {
        StoreError::Rejected(msg) => ServerError::bad_request(msg),
        StoreError::Unavailable(msg) => ServerError::new(StatusCode::SERVICE_UNAVAILABLE, msg),
        StoreError::Decode(msg) => ServerError::new(StatusCode::INTERNAL_SERVER_ERROR, msg),
    }
}

/// Driver failures surface as an unavailable store; only row decoding is
/// reported separately.
pub fn map_db_error(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
            StoreError::Decode(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn status_code_to_string(status: StatusCode) -> String {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::TOO_MANY_REQUESTS => CODE_RATE_LIMITED,
        StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
        StatusCode::SERVICE_UNAVAILABLE => "store_unavailable",
        _ => status.canonical_reason().unwrap_or("error"),
    }
    .to_string()
}
