//! Generador de documentos
//!
//! Lee un snapshot consistente de la orden, renderiza todos los formatos
//! pedidos en memoria y solo entonces persiste: la generación termina
//! completa o no deja ningún documento registrado.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::environment::CompanyInfo;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::document::{DocumentFormat, DocumentType, GeneratedDocument};
use crate::repositories::Repositories;
use crate::services::invoice_template::DocumentModel;
use crate::services::media_store::{content_digest, document_key, MediaStore};
use crate::services::metrics::PipelineMetrics;
use crate::services::order_locks::OrderLocks;
use crate::services::pdf_renderer::render_pdf;
use crate::services::state_machine::{transition, WorkOrderEvent};
use crate::utils::errors::{not_found_error, AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    IncompleteData,
    RenderFailure,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationErrorKind::IncompleteData => f.write_str("incomplete data"),
            GenerationErrorKind::RenderFailure => f.write_str("render failure"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Generation failed ({kind}): {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::IncompleteData,
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::RenderFailure,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Guardar los bytes en el media store y avanzar el estado de la orden
    pub persist: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { persist: true }
    }
}

/// Documento generado junto con sus bytes
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub document: GeneratedDocument,
    pub bytes: Vec<u8>,
}

pub struct DocumentGenerator {
    repos: Repositories,
    media: Arc<dyn MediaStore>,
    locks: OrderLocks,
    company: CompanyInfo,
    metrics: PipelineMetrics,
}

impl DocumentGenerator {
    pub fn new(
        repos: Repositories,
        media: Arc<dyn MediaStore>,
        locks: OrderLocks,
        company: CompanyInfo,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            repos,
            media,
            locks,
            company,
            metrics,
        }
    }

    /// Generar un documento en uno o más formatos
    pub async fn generate(
        &self,
        principal: &AuthenticatedUser,
        order_id: Uuid,
        document_type: DocumentType,
        formats: &[DocumentFormat],
        options: GenerationOptions,
    ) -> AppResult<Vec<RenderedDocument>> {
        let snapshot = self
            .repos
            .work_orders
            .snapshot(order_id)
            .await?
            .ok_or_else(|| not_found_error("WorkOrder", &order_id.to_string()))?;

        // Validar la transición antes de renderizar
        transition(snapshot.order.status, WorkOrderEvent::DocumentGenerated(document_type))?;

        let generated_at = Utc::now();
        let model = DocumentModel::build(&snapshot, document_type, &self.company, generated_at)?;

        let mut rendered = Vec::with_capacity(formats.len());
        for format in formats {
            let bytes = match format {
                DocumentFormat::Html => model
                    .render_html()
                    .map_err(|e| GenerationError::render(format!("HTML render error: {e}")))?
                    .into_bytes(),
                DocumentFormat::Pdf => render_pdf(&model)?,
            };

            rendered.push(RenderedDocument {
                document: GeneratedDocument {
                    id: Uuid::new_v4(),
                    order_id,
                    document_type,
                    format: *format,
                    storage_path: None,
                    content_digest: content_digest(&bytes),
                    generated_at,
                    generated_by: Some(principal.user_id),
                },
                bytes,
            });
        }

        if options.persist {
            self.persist(order_id, document_type, &mut rendered).await?;
        } else {
            for item in &rendered {
                self.repos.documents.record(&item.document).await?;
            }
        }

        for item in &rendered {
            self.metrics
                .documents_generated
                .with_label_values(&[document_type.as_str(), item.document.format.as_str()])
                .inc();
        }

        log::info!(
            "📄 {} generado para la orden {} ({} formato(s)) por {}",
            document_type.label(),
            order_id,
            rendered.len(),
            principal.username
        );

        Ok(rendered)
    }

    async fn persist(
        &self,
        order_id: Uuid,
        document_type: DocumentType,
        rendered: &mut [RenderedDocument],
    ) -> AppResult<()> {
        let mut written = Vec::with_capacity(rendered.len());
        for item in rendered.iter_mut() {
            let key = document_key(order_id, item.document.id, document_type, item.document.format);
            match self.media.put(&key, &item.bytes).await {
                Ok(stored) => {
                    item.document.storage_path = Some(stored.key.clone());
                    written.push(stored.key);
                }
                Err(e) => {
                    self.discard(&written).await;
                    return Err(e.into());
                }
            }
        }

        let result = async {
            let _guard = self.locks.lock(order_id).await;

            let mut order = self
                .repos
                .work_orders
                .find_by_id(order_id)
                .await?
                .ok_or_else(|| not_found_error("WorkOrder", &order_id.to_string()))?;
            order.status = transition(order.status, WorkOrderEvent::DocumentGenerated(document_type))?;

            let documents: Vec<GeneratedDocument> = rendered.iter().map(|item| item.document.clone()).collect();
            self.repos.documents.record_generation(&order, &documents).await?;
            Ok::<(), AppError>(())
        }
        .await;

        if result.is_err() {
            self.discard(&written).await;
        }
        result
    }

    /// Borrar blobs de una generación que no llegó a registrarse
    async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.media.remove(key).await {
                log::warn!("⚠️ No se pudo borrar el documento huérfano {}: {}", key, e);
            }
        }
    }

    pub async fn list(&self, order_id: Uuid) -> AppResult<Vec<GeneratedDocument>> {
        if self.repos.work_orders.find_by_id(order_id).await?.is_none() {
            return Err(not_found_error("WorkOrder", &order_id.to_string()));
        }
        self.repos.documents.list_by_order(order_id).await
    }

    /// Documento con sus bytes guardados
    pub async fn fetch(&self, order_id: Uuid, document_id: Uuid) -> AppResult<(GeneratedDocument, Vec<u8>)> {
        let document = self
            .repos
            .documents
            .find_by_id(document_id)
            .await?
            .filter(|doc| doc.order_id == order_id)
            .ok_or_else(|| not_found_error("Document", &document_id.to_string()))?;

        let key = document
            .storage_path
            .clone()
            .ok_or_else(|| AppError::NotFound(format!("Document '{}' was not persisted", document_id)))?;
        let bytes = self.media.get(&key).await?;

        Ok((document, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::customer::NewCustomer;
    use crate::models::work_order::{VehicleRef, WorkOrder, WorkOrderStatus};
    use crate::services::media_store::InMemoryMediaStore;

    fn principal() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: "front-desk".to_string(),
        }
    }

    async fn setup(with_customer: bool) -> (DocumentGenerator, Repositories, Arc<InMemoryMediaStore>, Uuid) {
        let repos = Repositories::in_memory();
        let media = Arc::new(InMemoryMediaStore::new());
        let customer_id = if with_customer {
            Some(
                repos
                    .customers
                    .create(NewCustomer::from_full_name("Ana Torres", None, None))
                    .await
                    .unwrap()
                    .id,
            )
        } else {
            None
        };

        let mut order = WorkOrder::new(customer_id, VehicleRef::default(), None, Utc::now());
        order.status = WorkOrderStatus::Processed;
        let order = repos.work_orders.create(&order).await.unwrap();

        let generator = DocumentGenerator::new(
            repos.clone(),
            media.clone(),
            OrderLocks::new(),
            CompanyInfo::default(),
            PipelineMetrics::new().unwrap(),
        );
        (generator, repos, media, order.id)
    }

    #[tokio::test]
    async fn test_generate_twice_appends_documents() {
        let (generator, repos, media, order_id) = setup(true).await;
        let principal = principal();

        for _ in 0..2 {
            generator
                .generate(&principal, order_id, DocumentType::Invoice, &[DocumentFormat::Html], GenerationOptions::default())
                .await
                .unwrap();
        }

        let order = repos.work_orders.find_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Invoiced);
        assert_eq!(repos.documents.count_by_order(order_id).await.unwrap(), 2);
        assert_eq!(media.len().await, 2);
    }

    #[tokio::test]
    async fn test_regenerating_unchanged_order_gives_same_content() {
        let (generator, _repos, media, order_id) = setup(true).await;
        let principal = principal();

        let mut digests = Vec::new();
        for _ in 0..2 {
            let rendered = generator
                .generate(&principal, order_id, DocumentType::Invoice, &[DocumentFormat::Html], GenerationOptions::default())
                .await
                .unwrap();
            digests.push(rendered[0].document.content_digest.clone());

            let key = rendered[0].document.storage_path.clone().unwrap();
            assert_eq!(media.get(&key).await.unwrap(), rendered[0].bytes);
        }

        assert_eq!(digests[0], digests[1]);
    }

    #[tokio::test]
    async fn test_missing_customer_records_nothing() {
        let (generator, repos, media, order_id) = setup(false).await;

        let err = generator
            .generate(
                &principal(),
                order_id,
                DocumentType::Estimate,
                &[DocumentFormat::Html, DocumentFormat::Pdf],
                GenerationOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Generation(GenerationError {
                kind: GenerationErrorKind::IncompleteData,
                ..
            })
        ));
        assert_eq!(repos.documents.count_by_order(order_id).await.unwrap(), 0);
        assert_eq!(media.len().await, 0);
    }

    #[tokio::test]
    async fn test_preview_does_not_change_status() {
        let (generator, repos, media, order_id) = setup(true).await;

        let rendered = generator
            .generate(
                &principal(),
                order_id,
                DocumentType::Estimate,
                &[DocumentFormat::Html],
                GenerationOptions { persist: false },
            )
            .await
            .unwrap();

        assert!(rendered[0].document.storage_path.is_none());
        let order = repos.work_orders.find_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Processed);
        assert_eq!(repos.documents.count_by_order(order_id).await.unwrap(), 1);
        assert_eq!(media.len().await, 0);
    }
}
