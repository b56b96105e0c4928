//! Repositorio de artefactos de media y del arena de resultados de extracción

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::media::{ArtifactKind, ArtifactOutcome, ExtractionRecord, MediaArtifact};
use crate::utils::errors::{AppError, AppResult};

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn create(&self, artifact: &MediaArtifact) -> AppResult<()>;

    /// Artefactos de la orden en orden de llegada
    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<MediaArtifact>>;

    /// Agregar resultados al arena; nunca reemplaza uno existente
    async fn record_outcomes(&self, records: &[ExtractionRecord]) -> AppResult<()>;

    /// Resultados de la orden, del más antiguo al más reciente
    async fn list_outcomes(&self, order_id: Uuid) -> AppResult<Vec<ExtractionRecord>>;
}

#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    order_id: Uuid,
    kind: String,
    position: i32,
    media_key: String,
    file_name: Option<String>,
    content_type: Option<String>,
    content_digest: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for MediaArtifact {
    type Error = AppError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        let kind = ArtifactKind::parse(&row.kind)
            .ok_or_else(|| AppError::Internal(format!("unknown artifact kind '{}'", row.kind)))?;

        Ok(MediaArtifact {
            id: row.id,
            order_id: row.order_id,
            kind,
            position: row.position,
            media_key: row.media_key,
            file_name: row.file_name,
            content_type: row.content_type,
            content_digest: row.content_digest,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutcomeRow {
    id: Uuid,
    artifact_id: Uuid,
    order_id: Uuid,
    run_id: Uuid,
    outcome: Json<ArtifactOutcome>,
    attempts: i32,
    completed_at: DateTime<Utc>,
}

impl From<OutcomeRow> for ExtractionRecord {
    fn from(row: OutcomeRow) -> Self {
        ExtractionRecord {
            id: row.id,
            artifact_id: row.artifact_id,
            order_id: row.order_id,
            run_id: row.run_id,
            outcome: row.outcome.0,
            attempts: row.attempts.max(0) as u32,
            completed_at: row.completed_at,
        }
    }
}

pub struct PgArtifactRepository {
    pool: PgPool,
}

impl PgArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactRepository for PgArtifactRepository {
    async fn create(&self, artifact: &MediaArtifact) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media_artifacts (id, order_id, kind, position, media_key, file_name, content_type, content_digest, size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(artifact.id)
        .bind(artifact.order_id)
        .bind(artifact.kind.as_str())
        .bind(artifact.position)
        .bind(&artifact.media_key)
        .bind(&artifact.file_name)
        .bind(&artifact.content_type)
        .bind(&artifact.content_digest)
        .bind(artifact.size_bytes)
        .bind(artifact.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<MediaArtifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM media_artifacts WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MediaArtifact::try_from).collect()
    }

    async fn record_outcomes(&self, records: &[ExtractionRecord]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO extraction_outcomes (id, artifact_id, order_id, run_id, outcome, attempts, completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.id)
            .bind(record.artifact_id)
            .bind(record.order_id)
            .bind(record.run_id)
            .bind(Json(&record.outcome))
            .bind(record.attempts as i32)
            .bind(record.completed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_outcomes(&self, order_id: Uuid) -> AppResult<Vec<ExtractionRecord>> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            "SELECT * FROM extraction_outcomes WHERE order_id = $1 ORDER BY completed_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExtractionRecord::from).collect())
    }
}
