//! API Error Types
//!
//! Every handler failure is converted to one of these variants at the HTTP
//! boundary and rendered as `{"success": false, "message": ...}` with the
//! matching status code. Unexpected store failures fold into `Internal`
//! without leaking the underlying message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::database::DatabaseError;

#[derive(Debug)]
pub enum ApiError {
    /// Missing, malformed, expired or otherwise unverifiable credentials.
    Unauthenticated(String),
    /// Valid credentials lacking the required privilege (e.g. non-admin).
    Unauthorized,
    NotFound(String),
    Conflict(String),
    InvalidInput(String),
    Internal,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthenticated(msg) => write!(f, "{}", msg),
            ApiError::Unauthorized => write!(f, "Forbidden"),
            ApiError::NotFound(msg) => write!(f, "{}", msg),
            ApiError::Conflict(msg) => write!(f, "{}", msg),
            ApiError::InvalidInput(msg) => write!(f, "{}", msg),
            ApiError::Internal => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("Unauthorized".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::NotFound(msg),
            DatabaseError::Conflict(msg) => ApiError::Conflict(msg),
            DatabaseError::InvalidData(msg) => ApiError::InvalidInput(msg),
            DatabaseError::Connection(err) | DatabaseError::Query(err) => {
                tracing::error!(error = %err, "database failure");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_not_found_maps_to_404() {
        let err: ApiError = DatabaseError::NotFound("repository not found".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn query_failure_folds_into_internal_without_leaking() {
        let err: ApiError = DatabaseError::Query(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }
}
