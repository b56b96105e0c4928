//! Services module
//!
//! Este módulo contiene la lógica de negocio del pipeline: intake y
//! extracción, máquina de estados, totales y generación de documentos.
//! Los servicios encapsulan operaciones que involucran varios modelos o
//! integraciones externas.

pub mod assembler;
pub mod document_generator;
pub mod extraction_gateway;
pub mod intake_queue;
pub mod invoice_template;
pub mod media_store;
pub mod metrics;
pub mod openai_gateway;
pub mod order_locks;
pub mod pdf_renderer;
pub mod state_machine;
pub mod totals;
pub mod vin;
pub mod vin_decoder;
pub mod work_order_service;

pub use assembler::WorkOrderAssembler;
pub use document_generator::DocumentGenerator;
pub use intake_queue::IntakeQueue;
pub use work_order_service::WorkOrderService;
