//! Repair Orders
//!
//! Backend de órdenes de trabajo para un taller mecánico: intake con media,
//! extracción asistida (VIN, odómetro, audio), edición humana y generación de
//! presupuestos y facturas.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use state::AppState;
