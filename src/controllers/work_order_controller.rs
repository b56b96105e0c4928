use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::dto::common_dto::ApiResponse;
use crate::dto::work_order_dto::{
    DeleteWorkOrderResponse, IntakeResponse, UpdateWorkOrderRequest, WorkOrderResponse,
};
use crate::middleware::auth::AuthenticatedUser;
use crate::services::assembler::{IntakeRequest, WorkOrderAssembler};
use crate::services::work_order_service::WorkOrderService;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub struct WorkOrderController {
    assembler: Arc<WorkOrderAssembler>,
    service: Arc<WorkOrderService>,
}

impl WorkOrderController {
    pub fn new(state: &AppState) -> Self {
        Self {
            assembler: state.assembler.clone(),
            service: state.work_orders.clone(),
        }
    }

    pub async fn intake(
        &self,
        principal: &AuthenticatedUser,
        request: IntakeRequest,
    ) -> Result<ApiResponse<IntakeResponse>, AppError> {
        let accepted = self.assembler.intake(principal, request).await?;

        Ok(ApiResponse::success_with_message(
            IntakeResponse {
                order_id: accepted.order_id,
                status: "accepted".to_string(),
                order_status: accepted.status,
            },
            "Work order accepted for processing".to_string(),
        ))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<WorkOrderResponse, AppError> {
        let detail = self.service.get(id).await?;
        Ok(WorkOrderResponse::from_detail(detail))
    }

    pub async fn list(&self, customer_id: Option<Uuid>) -> Result<Vec<WorkOrderResponse>, AppError> {
        let orders = self.service.list(customer_id).await?;
        Ok(orders.into_iter().map(WorkOrderResponse::from_order).collect())
    }

    pub async fn update(
        &self,
        principal: &AuthenticatedUser,
        id: Uuid,
        request: UpdateWorkOrderRequest,
    ) -> Result<ApiResponse<WorkOrderResponse>, AppError> {
        request.validate()?;
        // validator 0.16 no recorre los Vec<T> anidados sin `nested`
        if let Some(items) = &request.line_items {
            for item in items {
                item.validate()?;
            }
        }

        let outcome = self.service.edit(principal, id, request.into_edit()).await?;
        let response = WorkOrderResponse::from_order(outcome.order).with_warnings(outcome.warnings);

        Ok(ApiResponse::success_with_message(
            response,
            "Work order updated".to_string(),
        ))
    }

    pub async fn reprocess(
        &self,
        principal: &AuthenticatedUser,
        id: Uuid,
    ) -> Result<ApiResponse<WorkOrderResponse>, AppError> {
        let order = self.assembler.retrigger(principal, id).await?;

        Ok(ApiResponse::success_with_message(
            WorkOrderResponse::from_order(order),
            "Extraction re-triggered".to_string(),
        ))
    }

    pub async fn delete(&self, id: Uuid, cascade: bool) -> Result<ApiResponse<DeleteWorkOrderResponse>, AppError> {
        let documents_removed = self.service.delete(id, cascade).await?;

        Ok(ApiResponse::success_with_message(
            DeleteWorkOrderResponse {
                order_id: id,
                documents_removed,
                deleted_at: Utc::now(),
            },
            "Work order deleted".to_string(),
        ))
    }
}
