//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

/// Error returned by every handler.
///
/// Renders as `{"error": message}` with the matching status code.
#[derive(Debug)]
pub enum ApiError {
    Internal(lore_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    BadGateway(String),
}

impl From<lore_core::Error> for ApiError {
    fn from(err: lore_core::Error) -> Self {
        match err {
            lore_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            lore_core::Error::Forbidden(msg) => ApiError::Forbidden(msg),
            lore_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            lore_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            lore_core::Error::Tagger(msg) => ApiError::BadGateway(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                err.to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadGateway(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (lore_core::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (lore_core::Error::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (lore_core::Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (lore_core::Error::Conflict("x".into()), StatusCode::CONFLICT),
            (lore_core::Error::Tagger("x".into()), StatusCode::BAD_GATEWAY),
            (
                lore_core::Error::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_response_status() {
        let response = ApiError::Unauthorized("no owner".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
