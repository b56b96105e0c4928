use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::{DocumentFormat, DocumentType, GeneratedDocument};

fn default_persist() -> bool {
    true
}

// Request para generar factura o presupuesto
#[derive(Debug, Deserialize)]
pub struct GenerateDocumentRequest {
    #[serde(default)]
    pub generate_pdf: bool,
    #[serde(default)]
    pub send_email: bool,
    /// false = vista previa: se registra el documento pero no se guarda ni
    /// cambia el estado de la orden
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for GenerateDocumentRequest {
    fn default() -> Self {
        Self {
            generate_pdf: false,
            send_email: false,
            persist: true,
        }
    }
}

// Response de documento generado
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub document_type: DocumentType,
    pub format: DocumentFormat,
    pub storage_path: Option<String>,
    pub download_url: Option<String>,
    pub content_digest: String,
    pub generated_at: DateTime<Utc>,
}

impl From<GeneratedDocument> for DocumentResponse {
    fn from(document: GeneratedDocument) -> Self {
        let download_url = document
            .storage_path
            .as_ref()
            .map(|_| format!("/work-orders/{}/documents/{}", document.order_id, document.id));

        Self {
            id: document.id,
            order_id: document.order_id,
            document_type: document.document_type,
            format: document.format,
            storage_path: document.storage_path,
            download_url,
            content_digest: document.content_digest,
            generated_at: document.generated_at,
        }
    }
}

// Response de generación (factura/presupuesto)
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub status: String,
    pub document_type: DocumentType,
    pub html_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<String>,
    pub documents: Vec<DocumentResponse>,
}
