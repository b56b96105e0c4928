use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::controllers::document_controller::DocumentController;
use crate::dto::document_dto::{DocumentResponse, GenerateDocumentRequest, InvoiceResponse};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::document::DocumentType;
use crate::state::AppState;
use crate::utils::errors::{bad_request_error, AppError};

/// Rutas de documentos, anidadas bajo `/work-orders`
pub fn create_document_router() -> Router<AppState> {
    Router::new()
        .route("/:id/generate-invoice", post(generate_invoice))
        .route("/:id/generate-estimate", post(generate_estimate))
        .route("/:id/documents", get(list_documents))
        .route("/:id/documents/:document_id", get(download_document))
}

async fn generate_invoice(
    State(state): State<AppState>,
    principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<InvoiceResponse>, AppError> {
    generate(state, principal, id, DocumentType::Invoice, body).await
}

async fn generate_estimate(
    State(state): State<AppState>,
    principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<InvoiceResponse>, AppError> {
    generate(state, principal, id, DocumentType::Estimate, body).await
}

async fn generate(
    state: AppState,
    principal: AuthenticatedUser,
    id: Uuid,
    document_type: DocumentType,
    body: Bytes,
) -> Result<Json<InvoiceResponse>, AppError> {
    let request = parse_generate_request(&body)?;
    let controller = DocumentController::new(&state);
    let response = controller.generate(&principal, id, document_type, request).await?;
    Ok(Json(response))
}

/// Un body vacío equivale a las opciones por defecto; un JSON inválido es 400
fn parse_generate_request(body: &[u8]) -> Result<GenerateDocumentRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateDocumentRequest::default());
    }

    serde_json::from_slice(body)
        .map_err(|e| bad_request_error(&format!("Invalid document generation request: {}", e)))
}

async fn list_documents(
    State(state): State<AppState>,
    _principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let controller = DocumentController::new(&state);
    let response = controller.list(id).await?;
    Ok(Json(response))
}

async fn download_document(
    State(state): State<AppState>,
    _principal: AuthenticatedUser,
    Path((id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let controller = DocumentController::new(&state);
    let (document, bytes) = controller.download(id, document_id).await?;

    let file_name = format!(
        "{}_{}.{}",
        document.document_type.as_str(),
        &document.order_id.simple().to_string()[..8],
        document.format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, document.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", file_name)),
        ],
        bytes,
    )
        .into_response())
}
