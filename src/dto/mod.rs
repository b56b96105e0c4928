//! DTOs de la API
//!
//! Requests y responses de los endpoints de órdenes de trabajo y documentos.

pub mod common_dto;
pub mod document_dto;
pub mod work_order_dto;
