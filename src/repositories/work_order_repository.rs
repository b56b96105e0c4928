//! Repositorio de órdenes de trabajo
//!
//! Las escrituras usan el campo `version` como token de concurrencia
//! optimista: una actualización con versión vieja devuelve
//! `ConcurrencyConflict` y no toca la fila.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::customer::Customer;
use crate::models::line_item::LineItem;
use crate::models::vehicle::Vehicle;
use crate::models::work_order::{VehicleInfo, VehicleRef, WorkOrder, WorkOrderStatus};
use crate::services::totals;
use crate::utils::errors::{AppError, AppResult};

/// Lectura consistente de la orden con su customer y vehículo
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order: WorkOrder,
    pub customer: Option<Customer>,
    pub vehicle: Option<Vehicle>,
}

#[async_trait]
pub trait WorkOrderRepository: Send + Sync {
    async fn create(&self, order: &WorkOrder) -> AppResult<WorkOrder>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WorkOrder>>;

    /// Más recientes primero, opcionalmente filtradas por customer
    async fn list(&self, customer_id: Option<Uuid>) -> AppResult<Vec<WorkOrder>>;

    /// Persistir si `order.version` coincide con la versión almacenada.
    /// Devuelve la orden guardada con la versión incrementada.
    async fn update(&self, order: &WorkOrder) -> AppResult<WorkOrder>;

    /// Borrar la orden con sus artefactos, resultados y documentos.
    /// Devuelve cuántos documentos se eliminaron, o None si no existía.
    async fn delete(&self, id: Uuid) -> AppResult<Option<u64>>;

    async fn snapshot(&self, id: Uuid) -> AppResult<Option<OrderSnapshot>>;
}

/// Preparar la orden para persistir: totales recalculados como último paso
pub(crate) fn prepared(order: &WorkOrder) -> AppResult<WorkOrder> {
    let mut order = order.clone();
    totals::apply_totals(&mut order)?;
    Ok(order)
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WorkOrderRow {
    id: Uuid,
    customer_id: Option<Uuid>,
    vehicle_id: Option<Uuid>,
    vehicle_info: Json<VehicleInfo>,
    work_summary: String,
    summary_edited: bool,
    line_items: Json<Vec<LineItem>>,
    total_parts: Decimal,
    total_labor: Decimal,
    total: Decimal,
    status: String,
    processing_notes: Json<Vec<String>>,
    created_by: Option<Uuid>,
    extraction_run: Option<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WorkOrderRow> for WorkOrder {
    type Error = AppError;

    fn try_from(row: WorkOrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<WorkOrderStatus>()
            .map_err(AppError::Internal)?;

        let vehicle = match row.vehicle_id {
            Some(vehicle_id) => VehicleRef::Linked(vehicle_id),
            None => VehicleRef::Unstructured(row.vehicle_info.0),
        };

        Ok(WorkOrder {
            id: row.id,
            customer_id: row.customer_id,
            vehicle,
            work_summary: row.work_summary,
            summary_edited: row.summary_edited,
            line_items: row.line_items.0,
            total_parts: row.total_parts,
            total_labor: row.total_labor,
            total: row.total,
            status,
            processing_notes: row.processing_notes.0,
            created_by: row.created_by,
            extraction_run: row.extraction_run,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn vehicle_columns(vehicle: &VehicleRef) -> (Option<Uuid>, Json<VehicleInfo>) {
    match vehicle {
        VehicleRef::Linked(id) => (Some(*id), Json(VehicleInfo::default())),
        VehicleRef::Unstructured(info) => (None, Json(info.clone())),
    }
}

/// UPDATE condicionado a la versión; None si la versión no coincide o la
/// orden no existe
pub(crate) async fn update_versioned<'e, E>(executor: E, order: &WorkOrder) -> AppResult<Option<WorkOrderRow>>
where
    E: PgExecutor<'e>,
{
    let order = prepared(order)?;
    let (vehicle_id, vehicle_info) = vehicle_columns(&order.vehicle);

    let row = sqlx::query_as::<_, WorkOrderRow>(
        r#"
        UPDATE work_orders SET
            customer_id = $2,
            vehicle_id = $3,
            vehicle_info = $4,
            work_summary = $5,
            summary_edited = $6,
            line_items = $7,
            total_parts = $8,
            total_labor = $9,
            total = $10,
            status = $11,
            processing_notes = $12,
            extraction_run = $14,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $13
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(order.customer_id)
    .bind(vehicle_id)
    .bind(vehicle_info)
    .bind(&order.work_summary)
    .bind(order.summary_edited)
    .bind(Json(&order.line_items))
    .bind(order.total_parts)
    .bind(order.total_labor)
    .bind(order.total)
    .bind(order.status.as_str())
    .bind(Json(&order.processing_notes))
    .bind(order.version)
    .bind(order.extraction_run)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Traducir un UPDATE sin filas a NotFound o ConcurrencyConflict
pub(crate) async fn missing_update_error(pool: &PgPool, order: &WorkOrder) -> AppError {
    let current: Result<Option<(i64,)>, sqlx::Error> =
        sqlx::query_as("SELECT version FROM work_orders WHERE id = $1")
            .bind(order.id)
            .fetch_optional(pool)
            .await;

    match current {
        Ok(Some((version,))) => AppError::ConcurrencyConflict(format!(
            "Work order '{}' was modified concurrently (expected version {}, found {})",
            order.id, order.version, version
        )),
        Ok(None) => AppError::NotFound(format!("WorkOrder with id '{}' not found", order.id)),
        Err(e) => AppError::Database(e),
    }
}

pub struct PgWorkOrderRepository {
    pool: PgPool,
}

impl PgWorkOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkOrderRepository for PgWorkOrderRepository {
    async fn create(&self, order: &WorkOrder) -> AppResult<WorkOrder> {
        let order = prepared(order)?;
        let (vehicle_id, vehicle_info) = vehicle_columns(&order.vehicle);

        let row = sqlx::query_as::<_, WorkOrderRow>(
            r#"
            INSERT INTO work_orders (
                id, customer_id, vehicle_id, vehicle_info, work_summary, summary_edited,
                line_items, total_parts, total_labor, total, status, processing_notes,
                created_by, extraction_run, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(vehicle_id)
        .bind(vehicle_info)
        .bind(&order.work_summary)
        .bind(order.summary_edited)
        .bind(Json(&order.line_items))
        .bind(order.total_parts)
        .bind(order.total_labor)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(Json(&order.processing_notes))
        .bind(order.created_by)
        .bind(order.extraction_run)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WorkOrder>> {
        let row = sqlx::query_as::<_, WorkOrderRow>("SELECT * FROM work_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkOrder::try_from).transpose()
    }

    async fn list(&self, customer_id: Option<Uuid>) -> AppResult<Vec<WorkOrder>> {
        let rows = sqlx::query_as::<_, WorkOrderRow>(
            r#"
            SELECT * FROM work_orders
            WHERE ($1::uuid IS NULL OR customer_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkOrder::try_from).collect()
    }

    async fn update(&self, order: &WorkOrder) -> AppResult<WorkOrder> {
        match update_versioned(&self.pool, order).await? {
            Some(row) => row.try_into(),
            None => Err(missing_update_error(&self.pool, order).await),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let documents = sqlx::query("DELETE FROM generated_documents WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // media_artifacts y extraction_outcomes caen por ON DELETE CASCADE
        let deleted = sqlx::query("DELETE FROM work_orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(documents))
    }

    async fn snapshot(&self, id: Uuid) -> AppResult<Option<OrderSnapshot>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(row) = sqlx::query_as::<_, WorkOrderRow>("SELECT * FROM work_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let order = WorkOrder::try_from(row)?;

        let customer = match order.customer_id {
            Some(customer_id) => {
                sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
                    .bind(customer_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        let vehicle = match order.vehicle.vehicle_id() {
            Some(vehicle_id) => {
                sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1")
                    .bind(vehicle_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        tx.commit().await?;

        Ok(Some(OrderSnapshot {
            order,
            customer,
            vehicle,
        }))
    }
}
