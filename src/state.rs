//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum, y el arranque del pool de extracción.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::repositories::Repositories;
use crate::services::extraction_gateway::{ExtractionGateway, RetryPolicy};
use crate::services::intake_queue::IntakeQueue;
use crate::services::media_store::MediaStore;
use crate::services::metrics::PipelineMetrics;
use crate::services::order_locks::OrderLocks;
use crate::services::vin_decoder::VinDecoder;
use crate::services::{DocumentGenerator, WorkOrderAssembler, WorkOrderService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EnvironmentConfig>,
    pub repos: Repositories,
    pub media: Arc<dyn MediaStore>,
    pub assembler: Arc<WorkOrderAssembler>,
    pub work_orders: Arc<WorkOrderService>,
    pub documents: Arc<DocumentGenerator>,
    pub metrics: PipelineMetrics,
}

impl AppState {
    /// Armar los servicios y lanzar los workers de extracción.
    /// Debe llamarse dentro del runtime de tokio.
    pub fn start(
        config: EnvironmentConfig,
        repos: Repositories,
        media: Arc<dyn MediaStore>,
        gateway: Arc<dyn ExtractionGateway>,
        vin_decoder: Arc<dyn VinDecoder>,
    ) -> anyhow::Result<Self> {
        let metrics = PipelineMetrics::new()?;
        let locks = OrderLocks::new();
        let (queue, receiver) = IntakeQueue::channel(config.intake_queue_capacity);

        let retry = RetryPolicy::new(
            config.extraction_timeout,
            config.extraction_max_retries,
            config.extraction_backoff,
        );
        let assembler = Arc::new(
            WorkOrderAssembler::new(
                repos.clone(),
                media.clone(),
                gateway,
                vin_decoder,
                queue,
                locks.clone(),
                metrics.clone(),
            )
            .with_retry_policy(retry),
        );

        receiver.spawn_workers(assembler.clone(), config.intake_workers);
        log::info!(
            "👷 {} worker(s) de extracción (cola de {})",
            config.intake_workers,
            config.intake_queue_capacity
        );

        let work_orders = Arc::new(WorkOrderService::new(
            repos.clone(),
            media.clone(),
            assembler.clone(),
            locks.clone(),
        ));
        let documents = Arc::new(DocumentGenerator::new(
            repos.clone(),
            media.clone(),
            locks,
            config.company.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            repos,
            media,
            assembler,
            work_orders,
            documents,
            metrics,
        })
    }
}
