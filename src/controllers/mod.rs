pub mod document_controller;
pub mod work_order_controller;
