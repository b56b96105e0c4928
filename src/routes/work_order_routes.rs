use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::controllers::work_order_controller::WorkOrderController;
use crate::dto::common_dto::{ApiResponse, CascadeQuery};
use crate::dto::work_order_dto::{
    DeleteWorkOrderResponse, IntakeForm, IntakeResponse, ListWorkOrdersQuery, UpdateWorkOrderRequest,
    WorkOrderResponse,
};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::media::ArtifactKind;
use crate::services::assembler::{CustomerRef, InlineCustomer, IntakeRequest, MediaUpload};
use crate::state::AppState;
use crate::utils::errors::{bad_request_error, AppError};

pub fn create_work_order_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_work_order).get(list_work_orders))
        .route(
            "/:id",
            get(get_work_order).put(update_work_order).delete(delete_work_order),
        )
        .route("/:id/reprocess", post(reprocess_work_order))
}

async fn create_work_order(
    State(state): State<AppState>,
    principal: AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<IntakeResponse>>), AppError> {
    let request = read_intake(multipart).await?;
    let controller = WorkOrderController::new(&state);
    let response = controller.intake(&principal, request).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_work_orders(
    State(state): State<AppState>,
    _principal: AuthenticatedUser,
    Query(query): Query<ListWorkOrdersQuery>,
) -> Result<Json<Vec<WorkOrderResponse>>, AppError> {
    let controller = WorkOrderController::new(&state);
    let response = controller.list(query.customer_id).await?;
    Ok(Json(response))
}

async fn get_work_order(
    State(state): State<AppState>,
    _principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkOrderResponse>, AppError> {
    let controller = WorkOrderController::new(&state);
    let response = controller.get_by_id(id).await?;
    Ok(Json(response))
}

async fn update_work_order(
    State(state): State<AppState>,
    principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWorkOrderRequest>,
) -> Result<Json<ApiResponse<WorkOrderResponse>>, AppError> {
    let controller = WorkOrderController::new(&state);
    let response = controller.update(&principal, id, request).await?;
    Ok(Json(response))
}

async fn reprocess_work_order(
    State(state): State<AppState>,
    principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<WorkOrderResponse>>), AppError> {
    let controller = WorkOrderController::new(&state);
    let response = controller.reprocess(&principal, id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn delete_work_order(
    State(state): State<AppState>,
    _principal: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<CascadeQuery>,
) -> Result<Json<ApiResponse<DeleteWorkOrderResponse>>, AppError> {
    let controller = WorkOrderController::new(&state);
    let response = controller.delete(id, query.cascade).await?;
    Ok(Json(response))
}

/// Leer el multipart del intake: campos de texto del customer y los archivos
/// `vin_image`, `odometer_image` y `audio` (este último puede repetirse).
async fn read_intake(mut multipart: Multipart) -> Result<IntakeRequest, AppError> {
    let mut form = IntakeForm::default();
    let mut media = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(kind) = ArtifactKind::parse(&name) {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request_error(&format!("Could not read '{}': {}", name, e)))?;

            // Un input de archivo vacío llega sin nombre ni contenido
            if bytes.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
                continue;
            }

            media.push(MediaUpload {
                kind,
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| bad_request_error(&format!("Could not read '{}': {}", name, e)))?;
        let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());

        match name.as_str() {
            "customer_id" => form.customer_id = parse_uuid_field(&name, value)?,
            "vehicle_id" => form.vehicle_id = parse_uuid_field(&name, value)?,
            "customer_name" => form.customer_name = value,
            "customer_phone" => form.customer_phone = value,
            "customer_email" => form.customer_email = value,
            other => log::warn!("⚠️ Campo de intake ignorado: {}", other),
        }
    }

    form.validate()?;

    let customer = match form.customer_id {
        Some(id) => CustomerRef::Existing(id),
        None => CustomerRef::Inline(InlineCustomer {
            name: form.customer_name,
            phone: form.customer_phone,
            email: form.customer_email,
        }),
    };

    Ok(IntakeRequest {
        customer,
        vehicle_id: form.vehicle_id,
        media,
    })
}

fn parse_uuid_field(name: &str, value: Option<String>) -> Result<Option<Uuid>, AppError> {
    value
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|_| bad_request_error(&format!("'{}' is not a valid UUID", name)))
        })
        .transpose()
}
