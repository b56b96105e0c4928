//! Repositorio de documentos generados

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::work_order_repository::{missing_update_error, update_versioned};
use crate::models::document::{DocumentFormat, DocumentType, GeneratedDocument};
use crate::models::work_order::WorkOrder;
use crate::utils::errors::{AppError, AppResult};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Registrar un documento sin cambiar la orden (vista previa no persistida)
    async fn record(&self, document: &GeneratedDocument) -> AppResult<()>;

    /// Registrar los documentos y guardar la orden (estado nuevo) en una sola
    /// transacción, con chequeo de versión sobre la orden
    async fn record_generation(&self, order: &WorkOrder, documents: &[GeneratedDocument]) -> AppResult<WorkOrder>;

    /// Documentos de la orden, más recientes primero
    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<GeneratedDocument>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<GeneratedDocument>>;

    async fn count_by_order(&self, order_id: Uuid) -> AppResult<i64>;
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    order_id: Uuid,
    document_type: String,
    format: String,
    storage_path: Option<String>,
    content_digest: String,
    generated_at: DateTime<Utc>,
    generated_by: Option<Uuid>,
}

impl TryFrom<DocumentRow> for GeneratedDocument {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let document_type = DocumentType::parse(&row.document_type)
            .ok_or_else(|| AppError::Internal(format!("unknown document type '{}'", row.document_type)))?;
        let format = DocumentFormat::parse(&row.format)
            .ok_or_else(|| AppError::Internal(format!("unknown document format '{}'", row.format)))?;

        Ok(GeneratedDocument {
            id: row.id,
            order_id: row.order_id,
            document_type,
            format,
            storage_path: row.storage_path,
            content_digest: row.content_digest,
            generated_at: row.generated_at,
            generated_by: row.generated_by,
        })
    }
}

async fn insert_document<'e, E>(executor: E, document: &GeneratedDocument) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO generated_documents (id, order_id, document_type, format, storage_path, content_digest, generated_at, generated_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(document.id)
    .bind(document.order_id)
    .bind(document.document_type.as_str())
    .bind(document.format.as_str())
    .bind(&document.storage_path)
    .bind(&document.content_digest)
    .bind(document.generated_at)
    .bind(document.generated_by)
    .execute(executor)
    .await?;

    Ok(())
}

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn record(&self, document: &GeneratedDocument) -> AppResult<()> {
        insert_document(&self.pool, document).await?;
        Ok(())
    }

    async fn record_generation(&self, order: &WorkOrder, documents: &[GeneratedDocument]) -> AppResult<WorkOrder> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = update_versioned(&mut *tx, order).await? else {
            tx.rollback().await?;
            return Err(missing_update_error(&self.pool, order).await);
        };

        for document in documents {
            insert_document(&mut *tx, document).await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<GeneratedDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM generated_documents WHERE order_id = $1 ORDER BY generated_at DESC, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GeneratedDocument::try_from).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<GeneratedDocument>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM generated_documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(GeneratedDocument::try_from).transpose()
    }

    async fn count_by_order(&self, order_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM generated_documents WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
