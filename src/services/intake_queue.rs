//! Cola de extracción
//!
//! El intake responde enseguida y deja aquí un `ExtractionJob`. Un pool
//! acotado de workers consume la cola y ejecuta la extracción fuera del
//! ciclo request/response.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::work_order::WorkOrder;
use crate::services::assembler::WorkOrderAssembler;
use crate::utils::errors::{AppError, AppResult};

/// Una corrida de extracción sobre los artefactos guardados de una orden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionJob {
    pub order_id: Uuid,
    pub run_id: Uuid,
    /// Versión de la orden al despachar; si cambió, hubo ediciones durante la corrida
    pub dispatched_version: i64,
}

impl ExtractionJob {
    pub fn new(order_id: Uuid, run_id: Uuid, dispatched_version: i64) -> Self {
        Self {
            order_id,
            run_id,
            dispatched_version,
        }
    }

    /// Trabajo para la corrida registrada en una orden ya guardada
    pub fn for_order(order: &WorkOrder) -> Option<Self> {
        order
            .extraction_run
            .map(|run_id| Self::new(order.id, run_id, order.version))
    }
}

/// Lado productor de la cola
#[derive(Clone)]
pub struct IntakeQueue {
    sender: mpsc::Sender<ExtractionJob>,
}

/// Lado consumidor; se convierte en el pool de workers con `spawn_workers`
pub struct IntakeReceiver {
    receiver: mpsc::Receiver<ExtractionJob>,
}

impl IntakeQueue {
    /// Crear la cola con capacidad acotada
    pub fn channel(capacity: usize) -> (IntakeQueue, IntakeReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (IntakeQueue { sender }, IntakeReceiver { receiver })
    }

    /// Encolar un trabajo. Espera si la cola está llena.
    pub async fn submit(&self, job: ExtractionJob) -> AppResult<()> {
        self.sender.send(job).await.map_err(|_| {
            AppError::Internal(format!(
                "extraction queue is closed, job for order {} was not dispatched",
                job.order_id
            ))
        })?;

        log::info!("📥 Extracción encolada para la orden {} (run {})", job.order_id, job.run_id);
        Ok(())
    }
}

impl IntakeReceiver {
    /// Consumir la cola con como máximo `workers` extracciones simultáneas
    pub fn spawn_workers(mut self, assembler: Arc<WorkOrderAssembler>, workers: usize) -> JoinHandle<()> {
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        tokio::spawn(async move {
            log::info!("🚀 Pool de extracción iniciado con {} workers", workers.max(1));

            while let Some(job) = self.receiver.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let assembler = assembler.clone();
                tokio::spawn(async move {
                    assembler.process_job(job).await;
                    drop(permit);
                });
            }

            log::info!("🛑 Cola de extracción cerrada, pool detenido");
        })
    }

    /// Sacar el siguiente trabajo sin pool (tests)
    pub async fn next_job(&mut self) -> Option<ExtractionJob> {
        self.receiver.recv().await
    }
}
