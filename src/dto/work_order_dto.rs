use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::line_item::{LineItem, LineItemKind, LineItemSource};
use crate::models::work_order::{VehicleRef, WorkOrder, WorkOrderStatus};
use crate::services::work_order_service::{ArtifactView, WorkOrderDetail, WorkOrderEdit};
use crate::utils::validation::{validate_email, validate_money, validate_not_empty, validate_phone};

// Campos de texto del multipart de intake
#[derive(Debug, Default, Validate)]
pub struct IntakeForm {
    pub customer_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub customer_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub customer_phone: Option<String>,
    #[validate(custom = "validate_email")]
    pub customer_email: Option<String>,
    pub vehicle_id: Option<Uuid>,
}

// Respuesta del intake (202)
#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub order_id: Uuid,
    pub status: String,
    pub order_status: WorkOrderStatus,
}

// Filtro del listado
#[derive(Debug, Default, Deserialize)]
pub struct ListWorkOrdersQuery {
    pub customer_id: Option<Uuid>,
}

// Partida enviada en el PUT; el total lo calcula el servidor
#[derive(Debug, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(custom = "validate_not_empty")]
    pub description: String,
    #[serde(alias = "type")]
    pub kind: LineItemKind,
    #[validate(custom = "validate_money")]
    pub quantity: Decimal,
    #[validate(custom = "validate_money")]
    pub unit_price: Decimal,
    /// Solo se respeta para partidas extraídas que vuelven sin cambios
    #[serde(default)]
    pub source: LineItemSource,
}

// Request para actualizar una orden (PUT parcial)
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateWorkOrderRequest {
    pub customer_id: Option<Uuid>,
    pub vehicle: Option<VehicleRef>,
    #[validate(length(max = 20000))]
    pub work_summary: Option<String>,
    pub line_items: Option<Vec<LineItemRequest>>,
    pub status: Option<WorkOrderStatus>,
    pub version: Option<i64>,
}

impl UpdateWorkOrderRequest {
    pub fn into_edit(self) -> WorkOrderEdit {
        WorkOrderEdit {
            customer_id: self.customer_id,
            vehicle: self.vehicle,
            work_summary: self.work_summary,
            line_items: self.line_items.map(|items| {
                items
                    .into_iter()
                    .map(|item| {
                        LineItem::new(
                            item.description.trim(),
                            item.kind,
                            item.quantity,
                            item.unit_price,
                            item.source,
                        )
                    })
                    .collect()
            }),
            status: self.status,
            version: self.version,
        }
    }
}

// Response de orden de trabajo
#[derive(Debug, Serialize)]
pub struct WorkOrderResponse {
    #[serde(flatten)]
    pub order: WorkOrder,
    pub short_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<ArtifactView>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl WorkOrderResponse {
    pub fn from_order(order: WorkOrder) -> Self {
        Self {
            short_id: order.short_id(),
            order,
            artifacts: None,
            warnings: Vec::new(),
        }
    }

    pub fn from_detail(detail: WorkOrderDetail) -> Self {
        Self {
            artifacts: Some(detail.artifacts),
            ..Self::from_order(detail.order)
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

// Response del DELETE
#[derive(Debug, Serialize)]
pub struct DeleteWorkOrderResponse {
    pub order_id: Uuid,
    pub documents_removed: u64,
    pub deleted_at: DateTime<Utc>,
}
