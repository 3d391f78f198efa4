use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod source;
pub mod store;
pub mod util;

use capstan_render::GitCliRepository;

use crate::api::ControllerState;
use crate::engine::Engine;
use crate::pipeline::{
    BuildExecutor, CommandBuilder, PipelineService, SimulatedBuilder,
};
use crate::store::{MemoryStore, ObjectStore};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "capstan_controller=debug,tower_http=debug".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Capstan Controller...");

    let config = config::Config::from_env();
    config.validate().expect("Invalid configuration");

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(GitCliRepository::new(config.clones_root.clone()));

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        source,
        config.engine_settings(),
    ));

    // Re-track applications already on record, so a store backend that
    // survives restarts picks up where it left off
    let apps = repository::application::list(store.as_ref())
        .await
        .expect("Failed to load application records");
    if !apps.is_empty() {
        tracing::info!("Tracking {} applications from stored records", apps.len());
    }
    for app in apps {
        engine.spawn(app);
    }

    let executor: Arc<dyn BuildExecutor> = match &config.build_command {
        Some(command) => {
            tracing::info!("Pipeline runs will use the configured build command");
            Arc::new(CommandBuilder::new(command.clone()))
        }
        None => {
            tracing::info!("Pipeline runs will use the simulated builder");
            Arc::new(SimulatedBuilder::new(config.build_latency))
        }
    };
    let pipelines = Arc::new(PipelineService::new(
        Arc::clone(&store),
        executor,
        Arc::clone(&engine),
    ));

    // Build router with all API endpoints
    let app = api::create_router(ControllerState {
        store,
        engine,
        pipelines,
    });

    tracing::info!("Listening on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
