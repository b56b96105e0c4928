//! Modelos del sistema
//!
//! Este módulo contiene los modelos de dominio del pipeline de órdenes de
//! trabajo: clientes, vehículos, órdenes, partidas, media y documentos.

pub mod customer;
pub mod document;
pub mod line_item;
pub mod media;
pub mod vehicle;
pub mod work_order;
