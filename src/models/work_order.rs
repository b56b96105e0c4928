//! Modelo de WorkOrder
//!
//! La orden de trabajo es la raíz del agregado del pipeline. Los totales son
//! derivados y los recalcula `services::totals` antes de cada persistencia.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::line_item::LineItem;
use crate::services::totals;

/// Estado de la orden de trabajo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Draft,
    Pending,
    Processed,
    NeedsReview,
    Estimated,
    Invoiced,
    Error,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 7] = [
        WorkOrderStatus::Draft,
        WorkOrderStatus::Pending,
        WorkOrderStatus::Processed,
        WorkOrderStatus::NeedsReview,
        WorkOrderStatus::Estimated,
        WorkOrderStatus::Invoiced,
        WorkOrderStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Draft => "draft",
            WorkOrderStatus::Pending => "pending",
            WorkOrderStatus::Processed => "processed",
            WorkOrderStatus::NeedsReview => "needs_review",
            WorkOrderStatus::Estimated => "estimated",
            WorkOrderStatus::Invoiced => "invoiced",
            WorkOrderStatus::Error => "error",
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkOrderStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown work order status '{}'", s))
    }
}

/// Snapshot no estructurado del vehículo, usado cuando todavía no existe un
/// registro Vehicle formal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    /// Campos adicionales libres
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Referencia al vehículo: registro enlazado o snapshot libre. Nunca se
/// fusionan automáticamente.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleRef {
    Linked(Uuid),
    Unstructured(VehicleInfo),
}

impl Default for VehicleRef {
    fn default() -> Self {
        VehicleRef::Unstructured(VehicleInfo::default())
    }
}

impl VehicleRef {
    pub fn vehicle_id(&self) -> Option<Uuid> {
        match self {
            VehicleRef::Linked(id) => Some(*id),
            VehicleRef::Unstructured(_) => None,
        }
    }

    pub fn info(&self) -> Option<&VehicleInfo> {
        match self {
            VehicleRef::Linked(_) => None,
            VehicleRef::Unstructured(info) => Some(info),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkOrder {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub vehicle: VehicleRef,
    pub work_summary: String,
    /// Se marca cuando una persona edita el resumen; la extracción no lo pisa
    pub summary_edited: bool,
    pub line_items: Vec<LineItem>,
    pub total_parts: Decimal,
    pub total_labor: Decimal,
    pub total: Decimal,
    pub status: WorkOrderStatus,
    pub processing_notes: Vec<String>,
    pub created_by: Option<Uuid>,
    /// Última corrida de extracción despachada; solo su write-back se aplica
    #[serde(default)]
    pub extraction_run: Option<Uuid>,
    /// Token de concurrencia optimista
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    /// Crear una orden nueva en estado draft
    pub fn new(
        customer_id: Option<Uuid>,
        vehicle: VehicleRef,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            vehicle,
            work_summary: String::new(),
            summary_edited: false,
            line_items: Vec::new(),
            total_parts: Decimal::ZERO,
            total_labor: Decimal::ZERO,
            total: Decimal::ZERO,
            status: WorkOrderStatus::Draft,
            processing_notes: Vec::new(),
            created_by,
            extraction_run: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Número corto usado en documentos y nombres de archivo
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.processing_notes.push(note.into());
    }

    pub fn recompute_totals(&mut self) -> Result<(), totals::TotalsError> {
        totals::apply_totals(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in WorkOrderStatus::ALL {
            assert_eq!(status.as_str().parse::<WorkOrderStatus>().unwrap(), status);
        }
        assert!("archived".parse::<WorkOrderStatus>().is_err());
    }

    #[test]
    fn test_vehicle_ref_json_shape() {
        let id = Uuid::new_v4();
        let linked = serde_json::to_value(VehicleRef::Linked(id)).unwrap();
        assert_eq!(linked, serde_json::json!({ "linked": id.to_string() }));

        let parsed: VehicleRef = serde_json::from_value(serde_json::json!({
            "unstructured": { "vin": "11111111111111111", "color": "red" }
        }))
        .unwrap();
        let info = parsed.info().unwrap();
        assert_eq!(info.vin.as_deref(), Some("11111111111111111"));
        assert_eq!(info.extra["color"], "red");
    }

    #[test]
    fn test_new_order_is_draft_without_items() {
        let order = WorkOrder::new(None, VehicleRef::default(), None, Utc::now());
        assert_eq!(order.status, WorkOrderStatus::Draft);
        assert_eq!(order.total, Decimal::ZERO);
        assert_eq!(order.version, 0);
        assert_eq!(order.short_id().len(), 8);
    }
}
