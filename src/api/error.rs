//! Error → HTTP response mapping

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use crate::error::{ErrorKind, MarketError};

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::InsufficientStock | ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (kind.status(), Json(json!({ "error": kind.code(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MarketError::OrderNotFound(Uuid::nil()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(MarketError::OrderAccessDenied.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(MarketError::OrderNotPending.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(MarketError::Validation("x".into()).into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(MarketError::Storage("pool closed".into()).into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
