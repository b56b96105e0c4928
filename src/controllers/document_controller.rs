use std::sync::Arc;
use uuid::Uuid;

use crate::dto::document_dto::{DocumentResponse, GenerateDocumentRequest, InvoiceResponse};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::document::{DocumentFormat, DocumentType, GeneratedDocument};
use crate::services::document_generator::{DocumentGenerator, GenerationOptions};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub struct DocumentController {
    generator: Arc<DocumentGenerator>,
}

impl DocumentController {
    pub fn new(state: &AppState) -> Self {
        Self {
            generator: state.documents.clone(),
        }
    }

    pub async fn generate(
        &self,
        principal: &AuthenticatedUser,
        order_id: Uuid,
        document_type: DocumentType,
        request: GenerateDocumentRequest,
    ) -> Result<InvoiceResponse, AppError> {
        let mut formats = vec![DocumentFormat::Html];
        if request.generate_pdf {
            formats.push(DocumentFormat::Pdf);
        }

        let rendered = self
            .generator
            .generate(
                principal,
                order_id,
                document_type,
                &formats,
                GenerationOptions {
                    persist: request.persist,
                },
            )
            .await?;

        let documents: Vec<GeneratedDocument> = rendered.into_iter().map(|item| item.document).collect();
        let path_of = |format: DocumentFormat| {
            documents
                .iter()
                .find(|doc| doc.format == format)
                .and_then(|doc| doc.storage_path.clone())
        };

        // El envío de correo no está configurado en este servicio
        let email_status = request.send_email.then(|| "not_configured".to_string());

        Ok(InvoiceResponse {
            status: "success".to_string(),
            document_type,
            html_path: path_of(DocumentFormat::Html),
            pdf_path: path_of(DocumentFormat::Pdf),
            email_status,
            documents: documents.into_iter().map(DocumentResponse::from).collect(),
        })
    }

    pub async fn list(&self, order_id: Uuid) -> Result<Vec<DocumentResponse>, AppError> {
        let documents = self.generator.list(order_id).await?;
        Ok(documents.into_iter().map(DocumentResponse::from).collect())
    }

    pub async fn download(&self, order_id: Uuid, document_id: Uuid) -> Result<(GeneratedDocument, Vec<u8>), AppError> {
        self.generator.fetch(order_id, document_id).await
    }
}
