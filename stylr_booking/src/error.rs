use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Missing credentials")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BookingError::Unauthorized => StatusCode::UNAUTHORIZED,
            BookingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for BookingError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                BookingError::conflict("Time slot is no longer available")
            }
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
                BookingError::conflict("Concurrent update, please retry")
            }
            other => BookingError::Database(other.to_string()),
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            BookingError::Database(details) => {
                error!(%details, "Database request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(BookingError::not_found("Service not found"), StatusCode::NOT_FOUND)]
    #[test_case(BookingError::forbidden("You do not own this salon"), StatusCode::FORBIDDEN)]
    #[test_case(BookingError::conflict("Slot taken"), StatusCode::CONFLICT)]
    #[test_case(BookingError::bad_request("Invalid date"), StatusCode::BAD_REQUEST)]
    #[test_case(BookingError::Unauthorized, StatusCode::UNAUTHORIZED)]
    #[test_case(BookingError::Database("connection reset".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(err: BookingError, expected: StatusCode) {
        assert_eq!(err.into_response().status(), expected);
    }

    #[test]
    fn test_write_conflicts_map_to_conflict() {
        struct Info;
        impl diesel::result::DatabaseErrorInformation for Info {
            fn message(&self) -> &str {
                "duplicate key value violates unique constraint"
            }
            fn details(&self) -> Option<&str> {
                None
            }
            fn hint(&self) -> Option<&str> {
                None
            }
            fn table_name(&self) -> Option<&str> {
                None
            }
            fn column_name(&self) -> Option<&str> {
                None
            }
            fn constraint_name(&self) -> Option<&str> {
                None
            }
            fn statement_position(&self) -> Option<i32> {
                None
            }
        }

        let err = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new(Info),
        );
        assert!(matches!(BookingError::from(err), BookingError::Conflict(_)));

        // 40001 from a concurrent write is a conflict too
        let err = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::SerializationFailure,
            Box::new(Info),
        );
        let mapped = BookingError::from(err);
        assert!(matches!(mapped, BookingError::Conflict(_)));
        assert_eq!(mapped.status_code(), StatusCode::CONFLICT);
        assert!(matches!(
            BookingError::from(diesel::result::Error::NotFound),
            BookingError::Database(_)
        ));
    }
}
