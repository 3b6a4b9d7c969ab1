//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::info;

/// definitions for the colorpage application.
#[derive(Debug)]
pub enum ColorpageError {
    /// When the client didn't send what the endpoint needs
    BadRequest(String),
    /// Missing or invalid shared-password hash
    Unauthorized(String),
    /// A required secret or identifier is not configured
    Configuration(String),
    /// When DB operations fail
    DatabaseError(sea_orm::DbErr),
    /// When a requested resource is not found
    NotFound(String),
    /// The balance can't cover the request
    InsufficientCredits {
        /// credits the request costs
        required: i32,
        /// credits the profile holds
        available: i32,
    },
    /// A vendor API reported a failure; status and message pass through
    Upstream {
        /// vendor-reported HTTP status
        status: u16,
        /// vendor-reported message
        message: String,
    },
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<sea_orm::DbErr> for ColorpageError {
    fn from(err: sea_orm::DbErr) -> Self {
        ColorpageError::DatabaseError(err)
    }
}

impl From<std::io::Error> for ColorpageError {
    fn from(err: std::io::Error) -> Self {
        ColorpageError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ColorpageError {
    fn from(err: axum::http::Error) -> Self {
        ColorpageError::InternalServerError(err.to_string())
    }
}

impl From<reqwest::Error> for ColorpageError {
    fn from(err: reqwest::Error) -> Self {
        ColorpageError::InternalServerError(err.to_string())
    }
}

fn json_error(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ColorpageError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ColorpageError::BadRequest(message) => {
                info!("Bad request received: {}", message);
                json_error(StatusCode::BAD_REQUEST, &message)
            }
            ColorpageError::Unauthorized(message) => {
                info!("Unauthorized request received: {}", message);
                json_error(StatusCode::UNAUTHORIZED, &message)
            }
            ColorpageError::Configuration(message) => {
                tracing::error!("Server configuration error: {}", message);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
            ColorpageError::DatabaseError(err) => {
                tracing::error!("Database error: {}", err);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            ColorpageError::NotFound(what) => {
                info!("404 {}", what);
                json_error(StatusCode::NOT_FOUND, &format!("{} not found", what))
            }
            ColorpageError::InsufficientCredits {
                required,
                available,
            } => {
                info!(
                    "Insufficient credits: required {} but only {} available",
                    required, available
                );
                json_error(
                    StatusCode::BAD_REQUEST,
                    &format!(
                        "Insufficient credits: this request needs {} but only {} are available",
                        required, available
                    ),
                )
            }
            ColorpageError::Upstream { status, message } => {
                tracing::error!("Upstream API error {}: {}", status, message);
                let status = StatusCode::from_u16(status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                json_error(status, &message)
            }
            ColorpageError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
