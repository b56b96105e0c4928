//! Sistema de manejo de errores
//!
//! Este módulo define la taxonomía de errores de la API de órdenes de trabajo
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::document_generator::{GenerationError, GenerationErrorKind};
use crate::services::media_store::MediaStoreError;
use crate::services::state_machine::InvalidTransition;
use crate::services::totals::TotalsError;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Media store error: {0}")]
    MediaStore(#[from] MediaStoreError),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, message: String, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message,
            details: None,
            code: Some(code.to_string()),
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Database(e) => {
                tracing::error!("❌ Error de base de datos: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "Database Error",
                        "An error occurred while accessing the database".to_string(),
                        "DB_ERROR",
                    ),
                )
            }

            AppError::Validation(e) => {
                tracing::warn!("⚠️ Error de validación: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(
                        "Validation Error",
                        "The provided data is invalid".to_string(),
                        "VALIDATION_ERROR",
                    )
                    .with_details(json!(e)),
                )
            }

            AppError::BadRequest(msg) => {
                tracing::warn!("⚠️ Request inválido: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("Validation Error", msg, "VALIDATION_ERROR"),
                )
            }

            AppError::Unauthorized(msg) => {
                tracing::warn!("🔒 Acceso no autorizado: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("Unauthorized", msg, "UNAUTHORIZED"),
                )
            }

            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("Not Found", msg, "NOT_FOUND"),
            ),

            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("Conflict", msg, "CONFLICT"),
            ),

            AppError::ConcurrencyConflict(msg) => {
                tracing::warn!("⚠️ Conflicto de concurrencia: {}", msg);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("Concurrency Conflict", msg, "CONCURRENCY_CONFLICT"),
                )
            }

            AppError::InvalidTransition(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("Invalid Transition", e.to_string(), "INVALID_TRANSITION")
                    .with_details(json!({
                        "from": e.from.as_str(),
                        "event": e.event.to_string(),
                    })),
            ),

            AppError::Generation(e) => match e.kind {
                GenerationErrorKind::IncompleteData => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorResponse::new("Generation Error", e.message, "INCOMPLETE_DATA"),
                ),
                GenerationErrorKind::RenderFailure => {
                    tracing::error!("❌ Error renderizando documento: {}", e.message);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Generation Error", e.message, "RENDER_FAILURE"),
                    )
                }
            },

            AppError::MediaStore(e) => {
                tracing::error!("❌ Error del media store: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "Media Store Error",
                        "An error occurred while storing media".to_string(),
                        "MEDIA_STORE_ERROR",
                    )
                    .with_details(json!({ "media_error": e.to_string() })),
                )
            }

            AppError::ExternalApi(msg) => {
                tracing::error!("❌ Error de API externa: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new(
                        "External API Error",
                        "An error occurred while communicating with external service".to_string(),
                        "EXTERNAL_API_ERROR",
                    )
                    .with_details(json!({ "external_api_error": msg })),
                )
            }

            AppError::Internal(msg) => {
                tracing::error!("❌ Error interno: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "Internal Server Error",
                        "An unexpected error occurred".to_string(),
                        "INTERNAL_ERROR",
                    )
                    .with_details(json!({ "internal_error": msg })),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<TotalsError> for AppError {
    fn from(e: TotalsError) -> Self {
        let mut error = validator::ValidationError::new("amount_out_of_range");
        error.message = Some(e.to_string().into());
        let mut errors = validator::ValidationErrors::new();
        errors.add("line_items", error);
        AppError::Validation(errors)
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de solicitud incorrecta
pub fn bad_request_error(message: &str) -> AppError {
    AppError::BadRequest(message.to_string())
}
