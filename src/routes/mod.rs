//! Rutas HTTP
//!
//! Arma el router completo: `/health`, `/metrics` y todo lo de `/work-orders`.

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::cors_layer;
use crate::state::AppState;

pub mod document_routes;
pub mod health_routes;
pub mod work_order_routes;

/// Crear el router de la aplicación con el estado ya aplicado
pub fn create_router(state: AppState) -> Router {
    let work_orders = work_order_routes::create_work_order_router()
        .merge(document_routes::create_document_router());

    Router::new()
        .merge(health_routes::create_health_router())
        .nest("/work-orders", work_orders)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}
