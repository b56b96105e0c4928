//! Middleware del sistema
//!
//! Este módulo contiene el extractor de autenticación y la configuración de
//! CORS.

pub mod auth;
pub mod cors;

pub use auth::AuthenticatedUser;
pub use cors::cors_layer;
