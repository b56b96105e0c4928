//! Servicio de órdenes de trabajo
//!
//! Lectura, edición humana y borrado. Toda escritura toma el lock de la orden
//! y pasa por el chequeo de versión del repositorio.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::middleware::auth::AuthenticatedUser;
use crate::models::line_item::{LineItem, LineItemSource};
use crate::models::media::{ExtractionRecord, MediaArtifact};
use crate::models::work_order::{VehicleRef, WorkOrder, WorkOrderStatus};
use crate::repositories::Repositories;
use crate::services::assembler::WorkOrderAssembler;
use crate::services::media_store::MediaStore;
use crate::services::order_locks::OrderLocks;
use crate::services::state_machine::{edit_warning, transition, WorkOrderEvent};
use crate::utils::errors::{bad_request_error, not_found_error, AppError, AppResult};

/// Artefacto con el resultado de su corrida más reciente
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArtifactView {
    #[serde(flatten)]
    pub artifact: MediaArtifact,
    pub latest_outcome: Option<ExtractionRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrderDetail {
    pub order: WorkOrder,
    pub artifacts: Vec<ArtifactView>,
}

/// Edición parcial; los campos ausentes no se tocan
#[derive(Debug, Clone, Default)]
pub struct WorkOrderEdit {
    pub customer_id: Option<Uuid>,
    pub vehicle: Option<VehicleRef>,
    pub work_summary: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub status: Option<WorkOrderStatus>,
    pub version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub order: WorkOrder,
    pub warnings: Vec<String>,
}

pub struct WorkOrderService {
    repos: Repositories,
    media: Arc<dyn MediaStore>,
    assembler: Arc<WorkOrderAssembler>,
    locks: OrderLocks,
}

impl WorkOrderService {
    pub fn new(
        repos: Repositories,
        media: Arc<dyn MediaStore>,
        assembler: Arc<WorkOrderAssembler>,
        locks: OrderLocks,
    ) -> Self {
        Self {
            repos,
            media,
            assembler,
            locks,
        }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<WorkOrderDetail> {
        let order = self
            .repos
            .work_orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error("WorkOrder", &id.to_string()))?;

        let artifacts = self.repos.artifacts.list_by_order(id).await?;
        let outcomes = self.repos.artifacts.list_outcomes(id).await?;

        let artifacts = artifacts
            .into_iter()
            .map(|artifact| {
                let latest_outcome = outcomes
                    .iter()
                    .filter(|record| record.artifact_id == artifact.id)
                    .last()
                    .cloned();
                ArtifactView {
                    artifact,
                    latest_outcome,
                }
            })
            .collect();

        Ok(WorkOrderDetail { order, artifacts })
    }

    pub async fn list(&self, customer_id: Option<Uuid>) -> AppResult<Vec<WorkOrder>> {
        if let Some(customer_id) = customer_id {
            self.repos
                .customers
                .find_by_id(customer_id)
                .await?
                .ok_or_else(|| not_found_error("Customer", &customer_id.to_string()))?;
        }

        self.repos.work_orders.list(customer_id).await
    }

    /// Aplicar una edición humana
    pub async fn edit(&self, principal: &AuthenticatedUser, id: Uuid, edit: WorkOrderEdit) -> AppResult<EditOutcome> {
        let mut redispatch = false;
        let mut warnings = Vec::new();

        let order = {
            let _guard = self.locks.lock(id).await;

            let mut order = self
                .repos
                .work_orders
                .find_by_id(id)
                .await?
                .ok_or_else(|| not_found_error("WorkOrder", &id.to_string()))?;

            if let Some(version) = edit.version {
                if version != order.version {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "Work order '{}' is at version {}, edit was based on version {}",
                        id, order.version, version
                    )));
                }
            }

            if edit.work_summary.is_some() || edit.line_items.is_some() {
                warnings.extend(edit_warning(order.status));
            }

            if let Some(customer_id) = edit.customer_id {
                self.repos
                    .customers
                    .find_by_id(customer_id)
                    .await?
                    .ok_or_else(|| not_found_error("Customer", &customer_id.to_string()))?;
                order.customer_id = Some(customer_id);
            }

            if let Some(vehicle) = edit.vehicle {
                if let VehicleRef::Linked(vehicle_id) = vehicle {
                    self.repos
                        .vehicles
                        .find_by_id(vehicle_id)
                        .await?
                        .ok_or_else(|| not_found_error("Vehicle", &vehicle_id.to_string()))?;
                }
                order.vehicle = vehicle;
            }

            if let Some(work_summary) = edit.work_summary {
                order.work_summary = work_summary;
                order.summary_edited = true;
            }

            if let Some(line_items) = edit.line_items {
                order.line_items = reconcile_sources(&order.line_items, line_items);
            }

            match edit.status {
                None => {}
                Some(status) if status == order.status => {}
                Some(WorkOrderStatus::Pending) => {
                    self.assembler.prepare_retrigger(principal, &mut order).await?;
                    redispatch = true;
                }
                Some(WorkOrderStatus::Processed) => {
                    order.status = transition(order.status, WorkOrderEvent::MarkReviewed)?;
                    order.add_note(format!("Marked as reviewed by {}", principal.username));
                }
                Some(WorkOrderStatus::Error) => {
                    order.status = transition(order.status, WorkOrderEvent::Abandon)?;
                    order.add_note(format!("Marked as error by {}", principal.username));
                }
                Some(other) => {
                    return Err(bad_request_error(&format!(
                        "Status '{}' cannot be set directly",
                        other
                    )));
                }
            }

            order.recompute_totals()?;
            self.repos.work_orders.update(&order).await?
        };

        if redispatch {
            self.assembler.dispatch(&order).await?;
        }

        log::info!("✏️ Orden {} editada por {} (versión {})", order.id, principal.username, order.version);
        Ok(EditOutcome { order, warnings })
    }

    /// Borrar la orden. Con documentos generados exige `cascade`.
    /// Devuelve cuántos documentos se eliminaron.
    pub async fn delete(&self, id: Uuid, cascade: bool) -> AppResult<u64> {
        let _guard = self.locks.lock(id).await;

        if self.repos.work_orders.find_by_id(id).await?.is_none() {
            return Err(not_found_error("WorkOrder", &id.to_string()));
        }

        let documents = self.repos.documents.list_by_order(id).await?;
        if !documents.is_empty() && !cascade {
            return Err(AppError::Conflict(format!(
                "Work order '{}' has {} generated document(s); delete with cascade=true to remove them too",
                id,
                documents.len()
            )));
        }

        let artifacts = self.repos.artifacts.list_by_order(id).await?;

        let removed = self
            .repos
            .work_orders
            .delete(id)
            .await?
            .ok_or_else(|| not_found_error("WorkOrder", &id.to_string()))?;

        let keys = artifacts
            .iter()
            .map(|artifact| artifact.media_key.as_str())
            .chain(documents.iter().filter_map(|doc| doc.storage_path.as_deref()));
        for key in keys {
            if let Err(e) = self.media.remove(key).await {
                log::warn!("⚠️ No se pudo borrar la media {}: {}", key, e);
            }
        }

        log::info!("🗑️ Orden {} eliminada ({} documento(s))", id, removed);
        Ok(removed)
    }
}

/// Una partida conserva el origen extraído solo si vuelve idéntica a una
/// partida guardada de la misma corrida. Cualquier cambio la vuelve manual.
fn reconcile_sources(stored: &[LineItem], incoming: Vec<LineItem>) -> Vec<LineItem> {
    let mut unmatched: Vec<&LineItem> = stored.iter().filter(|item| item.source.is_extracted()).collect();

    incoming
        .into_iter()
        .map(|mut item| {
            if item.source.is_extracted() {
                match unmatched.iter().position(|candidate| same_content(candidate, &item)) {
                    Some(index) => {
                        unmatched.swap_remove(index);
                    }
                    None => item.source = LineItemSource::Manual,
                }
            }
            item
        })
        .collect()
}

fn same_content(stored: &LineItem, incoming: &LineItem) -> bool {
    stored.source == incoming.source
        && stored.description.trim() == incoming.description.trim()
        && stored.kind == incoming.kind
        && stored.quantity == incoming.quantity
        && stored.unit_price == incoming.unit_price
}
