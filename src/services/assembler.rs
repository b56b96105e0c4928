//! Work Order Assembler
//!
//! Recibe el intake (customer, vehículo y media), persiste la orden y guarda
//! cada blob antes de encolar la extracción. La extracción corre después en
//! el pool de workers: las llamadas al gateway van en paralelo y sin lock, y
//! solo el write-back final toma el lock de la orden.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

use crate::middleware::auth::AuthenticatedUser;
use crate::models::customer::{Customer, NewCustomer};
use crate::models::line_item::{LineItem, LineItemSource};
use crate::models::media::{ArtifactKind, ArtifactOutcome, ExtractedFields, ExtractionRecord, MediaArtifact};
use crate::models::vehicle::Vehicle;
use crate::models::work_order::{VehicleRef, WorkOrder, WorkOrderStatus};
use crate::repositories::Repositories;
use crate::services::extraction_gateway::{
    ExtractionError, ExtractionErrorKind, ExtractionGateway, ImageKind, MediaBlob, RetryPolicy,
    SummaryContext, WorkSummaryProposal,
};
use crate::services::intake_queue::{ExtractionJob, IntakeQueue};
use crate::services::media_store::{artifact_key, file_extension, MediaStore};
use crate::services::metrics::PipelineMetrics;
use crate::services::order_locks::OrderLocks;
use crate::services::state_machine::{transition, ExtractionVerdict, WorkOrderEvent};
use crate::services::vin;
use crate::services::vin_decoder::VinDecoder;
use crate::utils::errors::{bad_request_error, not_found_error, AppError, AppResult};

/// Datos de un customer nuevo enviados junto al intake
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineCustomer {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomerRef {
    Existing(Uuid),
    Inline(InlineCustomer),
}

/// Blob recibido en el multipart
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: ArtifactKind,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub customer: CustomerRef,
    pub vehicle_id: Option<Uuid>,
    pub media: Vec<MediaUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeAccepted {
    pub order_id: Uuid,
    pub status: WorkOrderStatus,
}

/// Resultado de un artefacto dentro de una corrida
#[derive(Debug, Clone)]
struct ArtifactResult {
    artifact: MediaArtifact,
    outcome: ArtifactOutcome,
    attempts: u32,
}

/// Contexto del write-back de una corrida
#[derive(Debug, Clone, Copy)]
struct WriteBack<'a> {
    run_id: Uuid,
    linked_vehicle: Option<&'a Vehicle>,
    /// La orden cambió de versión desde el despacho: hubo ediciones humanas
    edited_since_dispatch: bool,
}

pub struct WorkOrderAssembler {
    repos: Repositories,
    media: Arc<dyn MediaStore>,
    gateway: Arc<dyn ExtractionGateway>,
    vin_decoder: Arc<dyn VinDecoder>,
    queue: IntakeQueue,
    locks: OrderLocks,
    metrics: PipelineMetrics,
    retry: RetryPolicy,
}

impl WorkOrderAssembler {
    pub fn new(
        repos: Repositories,
        media: Arc<dyn MediaStore>,
        gateway: Arc<dyn ExtractionGateway>,
        vin_decoder: Arc<dyn VinDecoder>,
        queue: IntakeQueue,
        locks: OrderLocks,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            repos,
            media,
            gateway,
            vin_decoder,
            queue,
            locks,
            metrics,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Aceptar un intake: la orden queda persistida y la extracción encolada
    pub async fn intake(&self, principal: &AuthenticatedUser, request: IntakeRequest) -> AppResult<IntakeAccepted> {
        validate_media(&request.media)?;

        let customer = self.resolve_customer(request.customer).await?;
        let vehicle = match request.vehicle_id {
            Some(vehicle_id) => {
                let vehicle = self
                    .repos
                    .vehicles
                    .find_by_id(vehicle_id)
                    .await?
                    .ok_or_else(|| not_found_error("Vehicle", &vehicle_id.to_string()))?;
                if vehicle.customer_id != customer.id {
                    return Err(bad_request_error("Vehicle does not belong to the given customer"));
                }
                VehicleRef::Linked(vehicle.id)
            }
            None => VehicleRef::default(),
        };

        let mut order = WorkOrder::new(Some(customer.id), vehicle, Some(principal.user_id), Utc::now());

        if request.media.is_empty() {
            order.add_note("Created without media - manual entry");
            let order = self.repos.work_orders.create(&order).await?;
            self.metrics.intakes.inc();
            log::info!("📝 Orden {} creada en draft por {}", order.id, principal.username);
            return Ok(IntakeAccepted {
                order_id: order.id,
                status: order.status,
            });
        }

        order.status = transition(order.status, WorkOrderEvent::Submit)?;
        order.extraction_run = Some(Uuid::new_v4());
        order.add_note(format!("Intake received with {} media file(s)", request.media.len()));
        let order = self.repos.work_orders.create(&order).await?;

        if let Err(e) = self.store_media(&order, request.media).await {
            log::error!("❌ No se pudo guardar la media de la orden {}: {}", order.id, e);
            self.abandon(order.id, format!("Media storage failed: {}", e)).await;
            return Err(e);
        }

        self.dispatch(&order).await?;
        self.metrics.intakes.inc();
        log::info!("✅ Intake aceptado: orden {} por {}", order.id, principal.username);

        Ok(IntakeAccepted {
            order_id: order.id,
            status: order.status,
        })
    }

    /// Re-disparar la extracción de los artefactos guardados
    pub async fn retrigger(&self, principal: &AuthenticatedUser, order_id: Uuid) -> AppResult<WorkOrder> {
        let order = {
            let _guard = self.locks.lock(order_id).await;
            let mut order = self
                .repos
                .work_orders
                .find_by_id(order_id)
                .await?
                .ok_or_else(|| not_found_error("WorkOrder", &order_id.to_string()))?;

            self.prepare_retrigger(principal, &mut order).await?;
            self.repos.work_orders.update(&order).await?
        };

        self.dispatch(&order).await?;
        Ok(order)
    }

    /// Pasar la orden a pending para una nueva corrida. El llamador guarda
    /// la orden y luego llama a `dispatch`.
    pub(crate) async fn prepare_retrigger(&self, principal: &AuthenticatedUser, order: &mut WorkOrder) -> AppResult<()> {
        let next = transition(order.status, WorkOrderEvent::Retrigger)?;

        let artifacts = self.repos.artifacts.list_by_order(order.id).await?;
        if artifacts.is_empty() {
            return Err(bad_request_error("Work order has no media to reprocess"));
        }

        order.status = next;
        order.extraction_run = Some(Uuid::new_v4());
        order.add_note(format!("Extraction re-triggered by {}", principal.username));
        Ok(())
    }

    /// Encolar la corrida registrada en la orden ya guardada. Si no se puede
    /// encolar, la orden pasa a error en vez de quedar en pending.
    pub(crate) async fn dispatch(&self, order: &WorkOrder) -> AppResult<()> {
        let submitted = match ExtractionJob::for_order(order) {
            Some(job) => self.queue.submit(job).await,
            None => Err(AppError::Internal(format!(
                "work order {} has no extraction run to dispatch",
                order.id
            ))),
        };

        if let Err(e) = submitted {
            log::error!("❌ No se pudo encolar la extracción de la orden {}: {}", order.id, e);
            self.abandon(order.id, format!("Extraction could not be dispatched: {}", e)).await;
            return Err(e);
        }
        Ok(())
    }

    /// Ejecutar una corrida de extracción. Los errores se registran en el
    /// log; nunca vuelven al cliente, que ya recibió su 202.
    pub async fn process_job(&self, job: ExtractionJob) {
        if let Err(e) = self.run_extraction(job).await {
            log::error!("❌ Extracción de la orden {} falló: {}", job.order_id, e);
        }
    }

    async fn run_extraction(&self, job: ExtractionJob) -> AppResult<()> {
        let Some(order) = self.repos.work_orders.find_by_id(job.order_id).await? else {
            log::warn!("⚠️ Orden {} eliminada, se descarta la extracción", job.order_id);
            return Ok(());
        };
        if order.extraction_run != Some(job.run_id) {
            log::warn!("⚠️ Run {} de la orden {} fue reemplazado, se descarta", job.run_id, order.id);
            return Ok(());
        }
        if order.status != WorkOrderStatus::Pending {
            log::warn!(
                "⚠️ Orden {} en estado {}, se descarta la extracción",
                order.id,
                order.status
            );
            return Ok(());
        }

        let artifacts = self.repos.artifacts.list_by_order(order.id).await?;
        let linked_vehicle = match order.vehicle.vehicle_id() {
            Some(vehicle_id) => self.repos.vehicles.find_by_id(vehicle_id).await?,
            None => None,
        };

        log::info!(
            "🔄 Extrayendo {} artefacto(s) de la orden {} (run {})",
            artifacts.len(),
            order.id,
            job.run_id
        );

        let mut results: Vec<ArtifactResult> = join_all(artifacts.into_iter().map(|artifact| async move {
            let (outcome, attempts) = self.extract_artifact(&artifact).await;
            ArtifactResult {
                artifact,
                outcome,
                attempts,
            }
        }))
        .await;

        let mut notes = Vec::new();
        self.decode_vins(&mut results, &mut notes).await;

        let transcripts: Vec<String> = results
            .iter()
            .filter_map(|result| match result.outcome.fields() {
                Some(ExtractedFields::Transcript { text }) => Some(text.clone()),
                _ => None,
            })
            .collect();

        let summary = if transcripts.is_empty() {
            None
        } else {
            let context = summary_context(&results, linked_vehicle.as_ref());
            let (result, _) = self
                .retry
                .run("summary", || self.gateway.summarize(&transcripts, &context))
                .await;
            Some(result)
        };

        // Write-back serializado por orden
        let _guard = self.locks.lock(job.order_id).await;

        let Some(mut order) = self.repos.work_orders.find_by_id(job.order_id).await? else {
            log::warn!("⚠️ Orden {} eliminada durante la extracción", job.order_id);
            return Ok(());
        };

        let completed_at = Utc::now();
        let records: Vec<ExtractionRecord> = results
            .iter()
            .map(|result| ExtractionRecord {
                id: Uuid::new_v4(),
                artifact_id: result.artifact.id,
                order_id: order.id,
                run_id: job.run_id,
                outcome: result.outcome.clone(),
                attempts: result.attempts,
                completed_at,
            })
            .collect();
        self.repos.artifacts.record_outcomes(&records).await?;

        for result in &results {
            self.metrics
                .extraction_outcomes
                .with_label_values(&[result.artifact.kind.as_str(), result.outcome.label()])
                .inc();
        }

        if order.extraction_run != Some(job.run_id) {
            log::warn!(
                "⚠️ Run {} de la orden {} fue reemplazado durante la extracción, resultados registrados sin aplicar",
                job.run_id,
                order.id
            );
            return Ok(());
        }
        if order.status != WorkOrderStatus::Pending {
            log::warn!(
                "⚠️ Orden {} pasó a {} durante la extracción, resultados registrados sin aplicar",
                order.id,
                order.status
            );
            return Ok(());
        }

        let context = WriteBack {
            run_id: job.run_id,
            linked_vehicle: linked_vehicle.as_ref(),
            edited_since_dispatch: order.version != job.dispatched_version,
        };
        if context.edited_since_dispatch {
            log::info!(
                "✏️ Orden {} editada durante la extracción (versión {} -> {})",
                order.id,
                job.dispatched_version,
                order.version
            );
        }

        let verdict = apply_results(&mut order, &results, summary, &transcripts, notes, context)?;
        order.status = transition(order.status, WorkOrderEvent::ExtractionCompleted(verdict))?;

        let order = self.repos.work_orders.update(&order).await?;
        log::info!("✅ Orden {} procesada: {}", order.id, order.status);

        Ok(())
    }

    async fn extract_artifact(&self, artifact: &MediaArtifact) -> (ArtifactOutcome, u32) {
        let bytes = match self.media.get(&artifact.media_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return (
                    ArtifactOutcome::Failed {
                        kind: ExtractionErrorKind::UpstreamFailure,
                        reason: format!("media unavailable: {}", e),
                    },
                    0,
                )
            }
        };

        let blob = MediaBlob {
            bytes,
            file_name: artifact
                .file_name
                .clone()
                .unwrap_or_else(|| artifact.media_key.rsplit('/').next().unwrap_or_default().to_string()),
            content_type: artifact.content_type.clone(),
        };
        let blob = &blob;
        let gateway = self.gateway.as_ref();

        match artifact.kind {
            ArtifactKind::Audio => {
                let (result, attempts) = self.retry.run("audio", move || gateway.extract_audio(blob)).await;
                let outcome = match result {
                    Ok(text) if text.trim().is_empty() => ArtifactOutcome::LowConfidence {
                        reason: "Transcript is empty".to_string(),
                    },
                    Ok(text) => ArtifactOutcome::Succeeded {
                        fields: ExtractedFields::Transcript {
                            text: text.trim().to_string(),
                        },
                    },
                    Err(e) => failed_outcome(e),
                };
                (outcome, attempts)
            }
            ArtifactKind::VinImage => {
                let (result, attempts) = self
                    .retry
                    .run("vin", move || gateway.extract_image(blob, ImageKind::Vin))
                    .await;
                let outcome = match result.map(|extraction| extraction.vin) {
                    Ok(Some(raw)) => match vin::validate(&raw) {
                        Ok(vin) => ArtifactOutcome::Succeeded {
                            fields: ExtractedFields::Vin {
                                vin,
                                year: None,
                                make: None,
                                model: None,
                            },
                        },
                        Err(e) => ArtifactOutcome::LowConfidence {
                            reason: format!("VIN '{}' is not valid: {}", raw, e),
                        },
                    },
                    Ok(None) => ArtifactOutcome::LowConfidence {
                        reason: "No VIN found in image".to_string(),
                    },
                    Err(e) => failed_outcome(e),
                };
                (outcome, attempts)
            }
            ArtifactKind::OdometerImage => {
                let (result, attempts) = self
                    .retry
                    .run("odometer", move || gateway.extract_image(blob, ImageKind::Odometer))
                    .await;
                let outcome = match result.map(|extraction| extraction.odometer) {
                    Ok(Some(mileage)) => ArtifactOutcome::Succeeded {
                        fields: ExtractedFields::Odometer { mileage },
                    },
                    Ok(None) => ArtifactOutcome::LowConfidence {
                        reason: "No odometer reading found in image".to_string(),
                    },
                    Err(e) => failed_outcome(e),
                };
                (outcome, attempts)
            }
        }
    }

    /// Completar año, marca y modelo de los VIN válidos
    async fn decode_vins(&self, results: &mut [ArtifactResult], notes: &mut Vec<String>) {
        for result in results.iter_mut() {
            let ArtifactOutcome::Succeeded {
                fields: ExtractedFields::Vin { vin, year, make, model },
            } = &mut result.outcome
            else {
                continue;
            };

            match self.vin_decoder.decode(vin).await {
                Ok(decoded) => {
                    *year = decoded.year;
                    *make = decoded.make;
                    *model = decoded.model;
                    notes.push("VIN decoded successfully".to_string());
                }
                Err(e) => {
                    log::warn!("⚠️ No se pudo decodificar el VIN {}: {}", vin, e);
                    notes.push(format!("VIN decode failed: {}", e));
                }
            }
        }
    }

    async fn resolve_customer(&self, customer: CustomerRef) -> AppResult<Customer> {
        match customer {
            CustomerRef::Existing(id) => self
                .repos
                .customers
                .find_by_id(id)
                .await?
                .ok_or_else(|| not_found_error("Customer", &id.to_string())),
            CustomerRef::Inline(inline) => {
                let phone = non_empty(inline.phone);
                let email = non_empty(inline.email);

                if let Some(phone) = phone.as_deref() {
                    if let Some(existing) = self.repos.customers.find_by_phone(phone).await? {
                        log::info!("👤 Customer {} encontrado por teléfono", existing.id);
                        return Ok(existing);
                    }
                }
                if let Some(email) = email.as_deref() {
                    if let Some(existing) = self.repos.customers.find_by_email(email).await? {
                        log::info!("👤 Customer {} encontrado por email", existing.id);
                        return Ok(existing);
                    }
                }

                let name = non_empty(inline.name)
                    .ok_or_else(|| bad_request_error("Customer name is required for a new customer"))?;
                let customer = self
                    .repos
                    .customers
                    .create(NewCustomer::from_full_name(&name, phone, email))
                    .await?;
                log::info!("👤 Customer nuevo {} creado en el intake", customer.id);
                Ok(customer)
            }
        }
    }

    async fn store_media(&self, order: &WorkOrder, uploads: Vec<MediaUpload>) -> AppResult<()> {
        for (position, upload) in uploads.into_iter().enumerate() {
            let artifact_id = Uuid::new_v4();
            let fallback = match upload.kind {
                ArtifactKind::Audio => "m4a",
                ArtifactKind::VinImage | ArtifactKind::OdometerImage => "jpg",
            };
            let extension = upload
                .file_name
                .as_deref()
                .map(|name| file_extension(name, fallback))
                .unwrap_or_else(|| fallback.to_string());
            let key = artifact_key(order.id, artifact_id, upload.kind, &extension);

            let stored = self.media.put(&key, &upload.bytes).await?;

            let artifact = MediaArtifact {
                id: artifact_id,
                order_id: order.id,
                kind: upload.kind,
                position: position as i32,
                media_key: stored.key,
                file_name: upload.file_name,
                content_type: upload.content_type,
                content_digest: stored.digest,
                size_bytes: stored.size as i64,
                created_at: Utc::now(),
            };
            self.repos.artifacts.create(&artifact).await?;
        }

        Ok(())
    }

    async fn abandon(&self, order_id: Uuid, reason: String) {
        let _guard = self.locks.lock(order_id).await;

        let result = async {
            if let Some(mut order) = self.repos.work_orders.find_by_id(order_id).await? {
                order.status = transition(order.status, WorkOrderEvent::Abandon)?;
                order.add_note(reason);
                self.repos.work_orders.update(&order).await?;
            }
            AppResult::Ok(())
        }
        .await;

        if let Err(e) = result {
            log::error!("❌ No se pudo marcar la orden {} como error: {}", order_id, e);
        }
    }
}

fn validate_media(media: &[MediaUpload]) -> AppResult<()> {
    if media.iter().any(|upload| upload.bytes.is_empty()) {
        return Err(bad_request_error("Uploaded media files must not be empty"));
    }

    let count = |kind: ArtifactKind| media.iter().filter(|upload| upload.kind == kind).count();
    if count(ArtifactKind::VinImage) > 1 {
        return Err(bad_request_error("At most one VIN image is allowed per intake"));
    }
    if count(ArtifactKind::OdometerImage) > 1 {
        return Err(bad_request_error("At most one odometer image is allowed per intake"));
    }

    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn failed_outcome(error: ExtractionError) -> ArtifactOutcome {
    match error.kind {
        ExtractionErrorKind::LowConfidence => ArtifactOutcome::LowConfidence { reason: error.message },
        kind => ArtifactOutcome::Failed {
            kind,
            reason: error.message,
        },
    }
}

/// VIN y kilometraje de esta corrida, o los del vehículo enlazado
fn summary_context(results: &[ArtifactResult], linked_vehicle: Option<&Vehicle>) -> SummaryContext {
    let mut context = SummaryContext {
        vin: linked_vehicle.and_then(|v| v.vin.clone()),
        mileage: linked_vehicle.and_then(|v| v.mileage).and_then(|m| u32::try_from(m).ok()),
    };

    for result in results {
        match result.outcome.fields() {
            Some(ExtractedFields::Vin { vin, .. }) => context.vin = Some(vin.clone()),
            Some(ExtractedFields::Odometer { mileage }) => context.mileage = Some(*mileage),
            _ => {}
        }
    }

    context
}

/// Aplicar los resultados de la corrida sobre la orden recargada y devolver
/// el veredicto agregado
fn apply_results(
    order: &mut WorkOrder,
    results: &[ArtifactResult],
    summary: Option<Result<WorkSummaryProposal, ExtractionError>>,
    transcripts: &[String],
    extra_notes: Vec<String>,
    context: WriteBack<'_>,
) -> AppResult<ExtractionVerdict> {
    let mut ambiguous = false;
    let mut succeeded = false;

    for result in results {
        match &result.outcome {
            ArtifactOutcome::Succeeded { fields } => {
                succeeded = true;
                match fields {
                    ExtractedFields::Vin { vin, year, make, model } => {
                        order.add_note("VIN image processed");
                        match (&mut order.vehicle, context.linked_vehicle) {
                            (VehicleRef::Unstructured(info), _)
                                if context.edited_since_dispatch
                                    && info.vin.as_deref().is_some_and(|current| current != vin.as_str()) =>
                            {
                                ambiguous = true;
                                let note = format!(
                                    "Extracted VIN {} not applied: vehicle was edited during extraction",
                                    vin
                                );
                                order.add_note(note);
                            }
                            (VehicleRef::Unstructured(info), _) => {
                                info.vin = Some(vin.clone());
                                if year.is_some() {
                                    info.year = *year;
                                }
                                if make.is_some() {
                                    info.make = make.clone();
                                }
                                if model.is_some() {
                                    info.model = model.clone();
                                }
                            }
                            (VehicleRef::Linked(_), Some(vehicle)) => match vehicle.vin.as_deref() {
                                Some(recorded) if vin::normalize(recorded) != *vin => {
                                    ambiguous = true;
                                    order.add_note(format!(
                                        "Extracted VIN {} does not match linked vehicle VIN {}",
                                        vin, recorded
                                    ));
                                }
                                Some(_) => {}
                                None => order.add_note(format!(
                                    "Extracted VIN {} not applied: linked vehicle record has no VIN",
                                    vin
                                )),
                            },
                            (VehicleRef::Linked(_), None) => {
                                order.add_note(format!("Extracted VIN {} not applied: linked vehicle not found", vin))
                            }
                        }
                    }
                    ExtractedFields::Odometer { mileage } => {
                        order.add_note("Odometer image processed");
                        match &mut order.vehicle {
                            VehicleRef::Unstructured(info)
                                if context.edited_since_dispatch
                                    && info.mileage.is_some_and(|current| current != *mileage) =>
                            {
                                ambiguous = true;
                                let note = format!(
                                    "Odometer reading {} not applied: vehicle was edited during extraction",
                                    mileage
                                );
                                order.add_note(note);
                            }
                            VehicleRef::Unstructured(info) => info.mileage = Some(*mileage),
                            VehicleRef::Linked(_) => order.add_note(format!(
                                "Odometer reading {} not applied to linked vehicle record",
                                mileage
                            )),
                        }
                    }
                    ExtractedFields::Transcript { .. } => {
                        order.add_note(format!("Audio recording {} transcribed", result.artifact.position + 1));
                    }
                }
            }
            ArtifactOutcome::LowConfidence { reason } => {
                ambiguous = true;
                order.add_note(format!("{} needs review: {}", artifact_label(result.artifact.kind), reason));
            }
            ArtifactOutcome::Failed { reason, .. } => {
                order.add_note(format!(
                    "{} extraction failed - manual entry required ({})",
                    artifact_label(result.artifact.kind),
                    reason
                ));
            }
        }
    }

    for note in extra_notes {
        order.add_note(note);
    }

    match summary {
        Some(Ok(proposal)) => {
            if order.summary_edited {
                order.add_note("Work summary kept: edited by a person");
            } else {
                order.work_summary = proposal.work_summary;
            }

            if context.edited_since_dispatch {
                ambiguous = true;
                order.add_note(format!(
                    "Order edited during extraction: {} proposed line item(s) not applied, current items kept",
                    proposal.line_items.len()
                ));
            } else {
                order.line_items.retain(|item| !item.source.is_extracted());
                order.line_items.extend(proposal.line_items.into_iter().map(|item| {
                    LineItem::new(
                        item.description,
                        item.kind,
                        item.quantity,
                        item.unit_price,
                        LineItemSource::Extracted { run_id: context.run_id },
                    )
                }));
            }
            order.add_note(format!("Work summary generated from {} recording(s)", transcripts.len()));
        }
        Some(Err(e)) => {
            ambiguous = true;
            if !order.summary_edited {
                order.work_summary = transcripts.join(" ");
            }
            order.add_note(format!("Summary generation failed - transcript kept for review ({})", e));
        }
        None => {}
    }

    let run_source = LineItemSource::Extracted { run_id: context.run_id };
    if let Err(e) = order.recompute_totals() {
        ambiguous = true;
        order.line_items.retain(|item| item.source != run_source);
        order.add_note(format!("Proposed line items not applied: {}", e));
        order.recompute_totals()?;
    }

    Ok(aggregate_verdict(ambiguous, succeeded))
}

fn aggregate_verdict(ambiguous: bool, succeeded: bool) -> ExtractionVerdict {
    if ambiguous {
        ExtractionVerdict::Ambiguous
    } else if succeeded {
        ExtractionVerdict::Succeeded
    } else {
        ExtractionVerdict::Failed
    }
}

fn artifact_label(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Audio => "Audio",
        ArtifactKind::VinImage => "VIN",
        ArtifactKind::OdometerImage => "Odometer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::line_item::LineItemKind;
    use crate::services::extraction_gateway::{ImageExtraction, ProposedLineItem};
    use crate::services::intake_queue::IntakeReceiver;
    use crate::services::media_store::InMemoryMediaStore;
    use crate::services::vin_decoder::DecodedVehicle;
    use crate::services::work_order_service::{WorkOrderEdit, WorkOrderService};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::time::Duration;

    /// Gateway con respuestas fijas por tipo de artefacto
    struct ScriptedGateway {
        vin: Result<Option<String>, ExtractionError>,
        odometer: Result<Option<u32>, ExtractionError>,
        transcript: Result<String, ExtractionError>,
        items: Vec<ProposedLineItem>,
    }

    #[async_trait]
    impl ExtractionGateway for ScriptedGateway {
        async fn extract_audio(&self, _blob: &MediaBlob) -> Result<String, ExtractionError> {
            self.transcript.clone()
        }

        async fn extract_image(&self, _blob: &MediaBlob, kind: ImageKind) -> Result<ImageExtraction, ExtractionError> {
            match kind {
                ImageKind::Vin => self.vin.clone().map(|vin| ImageExtraction { vin, odometer: None }),
                ImageKind::Odometer => self.odometer.clone().map(|odometer| ImageExtraction { vin: None, odometer }),
            }
        }

        async fn summarize(
            &self,
            transcripts: &[String],
            _context: &SummaryContext,
        ) -> Result<WorkSummaryProposal, ExtractionError> {
            Ok(WorkSummaryProposal {
                work_summary: format!("Summary: {}", transcripts.join(" ")),
                line_items: self.items.clone(),
            })
        }
    }

    struct NoDecoder;

    #[async_trait]
    impl VinDecoder for NoDecoder {
        async fn decode(&self, _vin: &str) -> anyhow::Result<DecodedVehicle> {
            Err(anyhow::anyhow!("decoder offline"))
        }
    }

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn principal() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: "tech-1".to_string(),
        }
    }

    fn upload(kind: ArtifactKind, name: &str) -> MediaUpload {
        MediaUpload {
            kind,
            file_name: Some(name.to_string()),
            content_type: None,
            bytes: vec![1, 2, 3],
        }
    }

    fn assembler(gateway: ScriptedGateway) -> (WorkOrderAssembler, Repositories, IntakeReceiver) {
        let repos = Repositories::in_memory();
        let (queue, receiver) = IntakeQueue::channel(8);
        let assembler = WorkOrderAssembler::new(
            repos.clone(),
            Arc::new(InMemoryMediaStore::new()),
            Arc::new(gateway),
            Arc::new(NoDecoder),
            queue,
            OrderLocks::new(),
            PipelineMetrics::new().unwrap(),
        )
        .with_retry_policy(RetryPolicy::new(Duration::from_millis(200), 0, Duration::from_millis(1)));
        (assembler, repos, receiver)
    }

    fn oil_change_gateway() -> ScriptedGateway {
        ScriptedGateway {
            vin: Ok(None),
            odometer: Ok(None),
            transcript: Ok("Oil change".to_string()),
            items: vec![ProposedLineItem {
                description: "Oil".to_string(),
                kind: LineItemKind::Part,
                quantity: dec("5"),
                unit_price: dec("8.00"),
            }],
        }
    }

    fn audio_intake() -> IntakeRequest {
        IntakeRequest {
            customer: inline_customer(),
            vehicle_id: None,
            media: vec![upload(ArtifactKind::Audio, "memo.m4a")],
        }
    }

    fn inline_customer() -> CustomerRef {
        CustomerRef::Inline(InlineCustomer {
            name: Some("Ana Torres".to_string()),
            phone: Some("555-123-4567".to_string()),
            email: None,
        })
    }

    #[tokio::test]
    async fn test_failed_image_and_good_audio_is_processed() {
        let (assembler, repos, mut receiver) = assembler(ScriptedGateway {
            vin: Err(ExtractionError::upstream("vision 503")),
            odometer: Ok(Some(45_000)),
            transcript: Ok("Replaced brake pads".to_string()),
            items: vec![ProposedLineItem {
                description: "Brake pads".to_string(),
                kind: LineItemKind::Part,
                quantity: dec("2"),
                unit_price: dec("25.00"),
            }],
        });

        let accepted = assembler
            .intake(
                &principal(),
                IntakeRequest {
                    customer: inline_customer(),
                    vehicle_id: None,
                    media: vec![upload(ArtifactKind::VinImage, "vin.jpg"), upload(ArtifactKind::Audio, "memo.m4a")],
                },
            )
            .await
            .unwrap();
        assert_eq!(accepted.status, WorkOrderStatus::Pending);

        let job = receiver.next_job().await.unwrap();
        assembler.process_job(job).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Processed);
        assert_eq!(order.total, dec("50.00"));
        assert!(order.processing_notes.iter().any(|n| n.starts_with("VIN extraction failed")));
    }

    #[tokio::test]
    async fn test_short_vin_goes_to_review() {
        let (assembler, repos, mut receiver) = assembler(ScriptedGateway {
            vin: Ok(Some("1HGCM82633A00435".to_string())),
            odometer: Ok(None),
            transcript: Ok(String::new()),
            items: Vec::new(),
        });

        let accepted = assembler
            .intake(
                &principal(),
                IntakeRequest {
                    customer: inline_customer(),
                    vehicle_id: None,
                    media: vec![upload(ArtifactKind::VinImage, "vin.png")],
                },
            )
            .await
            .unwrap();

        assembler.process_job(receiver.next_job().await.unwrap()).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::NeedsReview);
        assert_eq!(order.vehicle.info().and_then(|info| info.vin.clone()), None);
    }

    #[tokio::test]
    async fn test_reprocess_keeps_manual_items_and_replaces_extracted() {
        let (assembler, repos, mut receiver) = assembler(ScriptedGateway {
            vin: Ok(None),
            odometer: Ok(None),
            transcript: Ok("Oil change".to_string()),
            items: vec![ProposedLineItem {
                description: "Oil".to_string(),
                kind: LineItemKind::Part,
                quantity: dec("5"),
                unit_price: dec("8.00"),
            }],
        });
        let principal = principal();

        let accepted = assembler
            .intake(
                &principal,
                IntakeRequest {
                    customer: inline_customer(),
                    vehicle_id: None,
                    media: vec![upload(ArtifactKind::Audio, "memo.m4a")],
                },
            )
            .await
            .unwrap();
        assembler.process_job(receiver.next_job().await.unwrap()).await;

        let mut order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        order
            .line_items
            .push(LineItem::manual("Shop supplies", LineItemKind::Part, dec("1"), dec("4.50")));
        repos.work_orders.update(&order).await.unwrap();

        assembler.retrigger(&principal, accepted.order_id).await.unwrap();
        assembler.process_job(receiver.next_job().await.unwrap()).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Processed);
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.total, dec("44.50"));

        let outcomes = repos.artifacts.list_outcomes(accepted.order_id).await.unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_inline_customer_matches_by_phone() {
        let (assembler, repos, _receiver) = assembler(ScriptedGateway {
            vin: Ok(None),
            odometer: Ok(None),
            transcript: Ok(String::new()),
            items: Vec::new(),
        });
        let existing = repos
            .customers
            .create(NewCustomer::from_full_name("Ana Torres", Some("555-123-4567".to_string()), None))
            .await
            .unwrap();

        let accepted = assembler
            .intake(
                &principal(),
                IntakeRequest {
                    customer: CustomerRef::Inline(InlineCustomer {
                        name: None,
                        phone: Some("555-123-4567".to_string()),
                        email: None,
                    }),
                    vehicle_id: None,
                    media: Vec::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(accepted.status, WorkOrderStatus::Draft);
        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.customer_id, Some(existing.id));
    }

    #[test]
    fn test_two_vin_images_are_rejected() {
        let media = vec![upload(ArtifactKind::VinImage, "a.jpg"), upload(ArtifactKind::VinImage, "b.jpg")];
        assert!(validate_media(&media).is_err());
    }

    #[test]
    fn test_verdict_priority() {
        assert_eq!(aggregate_verdict(true, true), ExtractionVerdict::Ambiguous);
        assert_eq!(aggregate_verdict(false, true), ExtractionVerdict::Succeeded);
        assert_eq!(aggregate_verdict(false, false), ExtractionVerdict::Failed);
    }

    #[tokio::test]
    async fn test_human_edit_during_extraction_survives_write_back() {
        let (assembler, repos, mut receiver) = assembler(oil_change_gateway());
        let assembler = Arc::new(assembler);
        let service = WorkOrderService::new(
            repos.clone(),
            Arc::new(InMemoryMediaStore::new()),
            assembler.clone(),
            OrderLocks::new(),
        );
        let principal = principal();

        let accepted = assembler.intake(&principal, audio_intake()).await.unwrap();
        assembler.process_job(receiver.next_job().await.unwrap()).await;

        assembler.retrigger(&principal, accepted.order_id).await.unwrap();
        let queued = receiver.next_job().await.unwrap();

        // Una persona corrige el precio de la partida extraída mientras la corrida sigue en cola
        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        let mut items = order.line_items.clone();
        items[0].unit_price = dec("6.00");
        let edited = service
            .edit(
                &principal,
                accepted.order_id,
                WorkOrderEdit {
                    line_items: Some(items),
                    version: Some(order.version),
                    ..WorkOrderEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.order.line_items[0].source, LineItemSource::Manual);
        assert_eq!(edited.order.total, dec("30.00"));

        assembler.process_job(queued).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].unit_price, dec("6.00"));
        assert_eq!(order.total, dec("30.00"));
        assert_eq!(order.status, WorkOrderStatus::NeedsReview);
        assert!(order
            .processing_notes
            .iter()
            .any(|note| note.starts_with("Order edited during extraction")));
    }

    #[tokio::test]
    async fn test_run_replaced_by_abandon_and_retrigger_is_ignored() {
        let (assembler, repos, mut receiver) = assembler(oil_change_gateway());
        let principal = principal();

        let accepted = assembler.intake(&principal, audio_intake()).await.unwrap();
        let replaced = receiver.next_job().await.unwrap();

        assembler.abandon(accepted.order_id, "Marked as error by tech-1".to_string()).await;
        assembler.retrigger(&principal, accepted.order_id).await.unwrap();
        let current = receiver.next_job().await.unwrap();
        assert_ne!(replaced.run_id, current.run_id);

        assembler.process_job(replaced).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Pending);
        assert!(order.line_items.is_empty());
        assert!(repos.artifacts.list_outcomes(accepted.order_id).await.unwrap().is_empty());

        assembler.process_job(current).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::Processed);
        assert_eq!(order.total, dec("40.00"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_moves_order_to_error() {
        let (assembler, repos, receiver) = assembler(oil_change_gateway());
        drop(receiver);

        let err = assembler.intake(&principal(), audio_intake()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let orders = repos.work_orders.list(None).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, WorkOrderStatus::Error);
        assert!(orders[0]
            .processing_notes
            .iter()
            .any(|note| note.starts_with("Extraction could not be dispatched")));
    }

    #[tokio::test]
    async fn test_out_of_range_proposal_is_dropped() {
        let mut gateway = oil_change_gateway();
        gateway.items[0].unit_price = dec("9999999999.99");
        let (assembler, repos, mut receiver) = assembler(gateway);

        let accepted = assembler.intake(&principal(), audio_intake()).await.unwrap();
        assembler.process_job(receiver.next_job().await.unwrap()).await;

        let order = repos.work_orders.find_by_id(accepted.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, WorkOrderStatus::NeedsReview);
        assert!(order.line_items.is_empty());
        assert_eq!(order.total, Decimal::ZERO);
    }
}
