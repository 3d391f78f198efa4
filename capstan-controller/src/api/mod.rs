//! API Module
//!
//! HTTP API layer for the controller.
//! Each submodule handles endpoints for a specific domain.

pub mod application;
pub mod error;
pub mod health;
pub mod pipeline;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::pipeline::PipelineService;
use crate::store::ObjectStore;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ControllerState {
    pub store: Arc<dyn ObjectStore>,
    pub engine: Arc<Engine>,
    pub pipelines: Arc<PipelineService>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: ControllerState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Application endpoints
        .route(
            "/application/create",
            post(application::create_application),
        )
        .route("/application/list", get(application::list_applications))
        .route("/application/{name}", get(application::get_application))
        .route(
            "/application/{name}",
            delete(application::delete_application),
        )
        .route(
            "/application/{name}/sync",
            post(application::sync_application),
        )
        .route("/application/{name}/status", get(application::get_status))
        // Pipeline endpoints
        .route("/pipeline/run", post(pipeline::submit_run))
        .route("/pipeline/run/{id}", get(pipeline::get_run))
        .route("/pipeline/run/{id}/wait", get(pipeline::wait_run))
        .route("/pipeline/runs", get(pipeline::list_runs))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
