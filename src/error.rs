//! Typed errors and HTTP mapping.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup failures. Any of these stops the process before the listener binds.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("database connection: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("schema reflection: {0}")]
    Reflection(#[source] sqlx::Error),
    #[error("schema '{0}' has no tables or views to expose")]
    EmptySchema(String),
    #[error("path collision: '{segment}' is claimed by {first} and {second}")]
    PathCollision {
        segment: String,
        first: String,
        second: String,
    },
    #[error("settings: {0}")]
    Settings(String),
}

/// One rejected field in a request payload or query string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("database: {0}")]
    Db(sqlx::Error),
}

impl AppError {
    /// Shorthand for a validation failure on a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }
}

/// How a driver-reported SQLSTATE is surfaced to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SqlStateClass {
    Conflict,
    Invalid,
    Unavailable,
}

/// SQLSTATE codes (or two-character class prefixes) translated into client errors.
/// Anything not listed stays an opaque database error.
const SQLSTATE_TABLE: &[(&str, SqlStateClass, &str)] = &[
    ("23505", SqlStateClass::Conflict, "a row with the same unique value already exists"),
    ("23503", SqlStateClass::Conflict, "the row references, or is referenced by, a missing row"),
    ("23P01", SqlStateClass::Conflict, "the row conflicts with an exclusion constraint"),
    ("23502", SqlStateClass::Invalid, "a required value is missing"),
    ("23514", SqlStateClass::Invalid, "a value violates a check constraint"),
    ("57014", SqlStateClass::Unavailable, "the statement timed out"),
    ("53300", SqlStateClass::Unavailable, "too many database connections"),
    ("22", SqlStateClass::Invalid, "a value is not valid for its column type"),
];

fn classify(code: &str) -> Option<(SqlStateClass, &'static str)> {
    SQLSTATE_TABLE
        .iter()
        .find(|(prefix, _, _)| code.starts_with(prefix))
        .map(|(_, class, message)| (*class, *message))
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => AppError::Unavailable("timed out waiting for a database connection".into()),
            sqlx::Error::PoolClosed => AppError::Unavailable("database pool is closed".into()),
            sqlx::Error::Io(_) => AppError::Unavailable("database connection failed".into()),
            sqlx::Error::RowNotFound => AppError::NotFound("record".into()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                match classify(&code) {
                    Some((SqlStateClass::Conflict, msg)) => AppError::Conflict(msg.into()),
                    Some((SqlStateClass::Invalid, msg)) => {
                        let field = db.constraint().unwrap_or("record").to_string();
                        AppError::field(field, msg)
                    }
                    Some((SqlStateClass::Unavailable, msg)) => AppError::Unavailable(msg.into()),
                    None => AppError::Db(e),
                }
            }
            _ => AppError::Db(e),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::NotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "not_allowed"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        };
        let (message, details) = match &self {
            AppError::Validation(errors) => (self.to_string(), serde_json::to_value(errors).ok()),
            AppError::Db(e) => {
                tracing::error!(error = %e, "unhandled database error");
                ("internal database error".to_string(), None)
            }
            _ => (self.to_string(), None),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}
