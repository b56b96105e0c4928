//! Implementación en memoria de los repositorios
//!
//! Se usa en desarrollo cuando no hay DATABASE_URL y en los tests. Un único
//! RwLock protege todas las tablas, así que cada operación es atómica.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::artifact_repository::ArtifactRepository;
use super::customer_repository::CustomerRepository;
use super::document_repository::DocumentRepository;
use super::vehicle_repository::VehicleRepository;
use super::work_order_repository::{prepared, OrderSnapshot, WorkOrderRepository};
use crate::models::customer::{Customer, NewCustomer};
use crate::models::document::GeneratedDocument;
use crate::models::media::{ExtractionRecord, MediaArtifact};
use crate::models::vehicle::{NewVehicle, Vehicle};
use crate::models::work_order::WorkOrder;
use crate::utils::errors::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    customers: Vec<Customer>,
    vehicles: HashMap<Uuid, Vehicle>,
    work_orders: HashMap<Uuid, WorkOrder>,
    artifacts: Vec<MediaArtifact>,
    outcomes: Vec<ExtractionRecord>,
    documents: Vec<GeneratedDocument>,
}

impl Tables {
    /// Chequeo de versión + escritura de la orden
    fn store_versioned(&mut self, order: &WorkOrder) -> AppResult<WorkOrder> {
        let current = self
            .work_orders
            .get(&order.id)
            .ok_or_else(|| AppError::NotFound(format!("WorkOrder with id '{}' not found", order.id)))?;

        if current.version != order.version {
            return Err(AppError::ConcurrencyConflict(format!(
                "Work order '{}' was modified concurrently (expected version {}, found {})",
                order.id, order.version, current.version
            )));
        }

        let mut stored = prepared(order)?;
        stored.version = current.version + 1;
        stored.created_at = current.created_at;
        stored.updated_at = Utc::now();
        self.work_orders.insert(stored.id, stored.clone());

        Ok(stored)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn create(&self, new_customer: NewCustomer) -> AppResult<Customer> {
        let customer = new_customer.into_customer(Utc::now());
        self.tables.write().await.customers.push(customer.clone());
        Ok(customer)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .find(|c| c.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .find(|c| {
                c.email
                    .as_deref()
                    .map(|e| e.eq_ignore_ascii_case(email))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        let references = tables
            .work_orders
            .values()
            .filter(|o| o.customer_id == Some(id))
            .count();
        if references > 0 {
            return Err(AppError::Conflict(format!(
                "Customer '{}' is referenced by {} work order(s)",
                id, references
            )));
        }

        let before = tables.customers.len();
        tables.customers.retain(|c| c.id != id);
        if tables.customers.len() == before {
            return Err(AppError::NotFound(format!("Customer with id '{}' not found", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl VehicleRepository for InMemoryStore {
    async fn create(&self, new_vehicle: NewVehicle) -> AppResult<Vehicle> {
        let vehicle = new_vehicle.into_vehicle(Utc::now());
        self.tables
            .write()
            .await
            .vehicles
            .insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Vehicle>> {
        Ok(self.tables.read().await.vehicles.get(&id).cloned())
    }
}

#[async_trait]
impl WorkOrderRepository for InMemoryStore {
    async fn create(&self, order: &WorkOrder) -> AppResult<WorkOrder> {
        let mut tables = self.tables.write().await;
        if tables.work_orders.contains_key(&order.id) {
            return Err(AppError::Conflict(format!("WorkOrder '{}' already exists", order.id)));
        }

        let stored = prepared(order)?;
        tables.work_orders.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WorkOrder>> {
        Ok(self.tables.read().await.work_orders.get(&id).cloned())
    }

    async fn list(&self, customer_id: Option<Uuid>) -> AppResult<Vec<WorkOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<WorkOrder> = tables
            .work_orders
            .values()
            .filter(|o| customer_id.is_none() || o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn update(&self, order: &WorkOrder) -> AppResult<WorkOrder> {
        self.tables.write().await.store_versioned(order)
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<u64>> {
        let mut tables = self.tables.write().await;
        if tables.work_orders.remove(&id).is_none() {
            return Ok(None);
        }

        let before = tables.documents.len();
        tables.documents.retain(|d| d.order_id != id);
        let removed = (before - tables.documents.len()) as u64;

        tables.artifacts.retain(|a| a.order_id != id);
        tables.outcomes.retain(|r| r.order_id != id);

        Ok(Some(removed))
    }

    async fn snapshot(&self, id: Uuid) -> AppResult<Option<OrderSnapshot>> {
        let tables = self.tables.read().await;
        let Some(order) = tables.work_orders.get(&id).cloned() else {
            return Ok(None);
        };

        let customer = order
            .customer_id
            .and_then(|customer_id| tables.customers.iter().find(|c| c.id == customer_id).cloned());
        let vehicle = order
            .vehicle
            .vehicle_id()
            .and_then(|vehicle_id| tables.vehicles.get(&vehicle_id).cloned());

        Ok(Some(OrderSnapshot {
            order,
            customer,
            vehicle,
        }))
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryStore {
    async fn create(&self, artifact: &MediaArtifact) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.work_orders.contains_key(&artifact.order_id) {
            return Err(AppError::NotFound(format!(
                "WorkOrder with id '{}' not found",
                artifact.order_id
            )));
        }
        tables.artifacts.push(artifact.clone());
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<MediaArtifact>> {
        let tables = self.tables.read().await;
        let mut artifacts: Vec<MediaArtifact> = tables
            .artifacts
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| a.position);
        Ok(artifacts)
    }

    async fn record_outcomes(&self, records: &[ExtractionRecord]) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        for record in records {
            let duplicate = tables
                .outcomes
                .iter()
                .any(|r| r.artifact_id == record.artifact_id && r.run_id == record.run_id);
            if duplicate {
                return Err(AppError::Conflict(format!(
                    "Outcome for artifact '{}' in run '{}' already recorded",
                    record.artifact_id, record.run_id
                )));
            }
        }
        tables.outcomes.extend(records.iter().cloned());
        Ok(())
    }

    async fn list_outcomes(&self, order_id: Uuid) -> AppResult<Vec<ExtractionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .outcomes
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn record(&self, document: &GeneratedDocument) -> AppResult<()> {
        self.tables.write().await.documents.push(document.clone());
        Ok(())
    }

    async fn record_generation(&self, order: &WorkOrder, documents: &[GeneratedDocument]) -> AppResult<WorkOrder> {
        let mut tables = self.tables.write().await;
        let stored = tables.store_versioned(order)?;
        tables.documents.extend(documents.iter().cloned());
        Ok(stored)
    }

    async fn list_by_order(&self, order_id: Uuid) -> AppResult<Vec<GeneratedDocument>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<GeneratedDocument> = tables
            .documents
            .iter()
            .rev()
            .filter(|d| d.order_id == order_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(documents)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<GeneratedDocument>> {
        let tables = self.tables.read().await;
        Ok(tables.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn count_by_order(&self, order_id: Uuid) -> AppResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.documents.iter().filter(|d| d.order_id == order_id).count() as i64)
    }
}
