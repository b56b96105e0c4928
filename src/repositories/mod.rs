//! Repositorios
//!
//! Contratos de persistencia del pipeline con implementación PostgreSQL
//! (sqlx) y en memoria.

pub mod artifact_repository;
pub mod customer_repository;
pub mod document_repository;
pub mod memory;
pub mod vehicle_repository;
pub mod work_order_repository;

use sqlx::PgPool;
use std::sync::Arc;

pub use artifact_repository::{ArtifactRepository, PgArtifactRepository};
pub use customer_repository::{CustomerRepository, PgCustomerRepository};
pub use document_repository::{DocumentRepository, PgDocumentRepository};
pub use memory::InMemoryStore;
pub use vehicle_repository::{PgVehicleRepository, VehicleRepository};
pub use work_order_repository::{OrderSnapshot, PgWorkOrderRepository, WorkOrderRepository};

/// Conjunto de repositorios que comparten los servicios
#[derive(Clone)]
pub struct Repositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub vehicles: Arc<dyn VehicleRepository>,
    pub work_orders: Arc<dyn WorkOrderRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub documents: Arc<dyn DocumentRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            vehicles: Arc::new(PgVehicleRepository::new(pool.clone())),
            work_orders: Arc::new(PgWorkOrderRepository::new(pool.clone())),
            artifacts: Arc::new(PgArtifactRepository::new(pool.clone())),
            documents: Arc::new(PgDocumentRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            customers: store.clone(),
            vehicles: store.clone(),
            work_orders: store.clone(),
            artifacts: store.clone(),
            documents: store,
        }
    }
}
