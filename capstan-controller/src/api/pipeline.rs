//! Pipeline API Handlers
//!
//! HTTP endpoints for build-and-push runs.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use capstan_core::domain::run::PipelineRun;
use capstan_core::dto::run::SubmitRun;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::api::ControllerState;
use crate::api::error::{ApiError, ApiResult};
use crate::pipeline::PipelineError;

/// POST /pipeline/run
/// Submit a new build-and-push run
pub async fn submit_run(
    State(state): State<ControllerState>,
    Json(req): Json<SubmitRun>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::info!(
        "Submitting pipeline run: ref {} tag {}",
        req.source_ref,
        req.image_tag
    );

    let run = state.pipelines.submit(req).await.map_err(|e| match e {
        PipelineError::RunNotFound(id) => {
            ApiError::NotFound(format!("Pipeline run {} not found", id))
        }
        PipelineError::ApplicationNotFound(name) => {
            ApiError::NotFound(format!("Application {} not found", name))
        }
        PipelineError::Validation(msg) => ApiError::BadRequest(msg),
        PipelineError::Store(err) => ApiError::StoreError(err),
    })?;

    Ok(Json(run))
}

/// GET /pipeline/run/{id}
/// Get a pipeline run by id
pub async fn get_run(
    State(state): State<ControllerState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting pipeline run: {}", id);

    let run = state.pipelines.get_run(id).await.map_err(|e| match e {
        PipelineError::RunNotFound(id) => {
            ApiError::NotFound(format!("Pipeline run {} not found", id))
        }
        PipelineError::ApplicationNotFound(name) => {
            ApiError::NotFound(format!("Application {} not found", name))
        }
        PipelineError::Validation(msg) => ApiError::BadRequest(msg),
        PipelineError::Store(err) => ApiError::StoreError(err),
    })?;

    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    /// Seconds to wait before returning the run as-is
    #[serde(default = "default_wait_secs")]
    pub timeout_secs: u64,
}

fn default_wait_secs() -> u64 {
    60
}

/// GET /pipeline/run/{id}/wait
/// Wait until the run reaches a terminal outcome or the timeout expires;
/// on timeout the run is returned still Pending
pub async fn wait_run(
    State(state): State<ControllerState>,
    Path(id): Path<Uuid>,
    Query(params): Query<WaitParams>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!(
        "Waiting up to {}s for pipeline run: {}",
        params.timeout_secs,
        id
    );

    let run = state
        .pipelines
        .await_run(id, Duration::from_secs(params.timeout_secs))
        .await
        .map_err(|e| match e {
            PipelineError::RunNotFound(id) => {
                ApiError::NotFound(format!("Pipeline run {} not found", id))
            }
            PipelineError::ApplicationNotFound(name) => {
                ApiError::NotFound(format!("Application {} not found", name))
            }
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::Store(err) => ApiError::StoreError(err),
        })?;

    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Restrict to runs linked to one application
    pub application: Option<String>,
}

/// GET /pipeline/runs
/// List runs in submission order
pub async fn list_runs(
    State(state): State<ControllerState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    tracing::debug!("Listing pipeline runs");

    let runs = state
        .pipelines
        .list_runs(params.application.as_deref())
        .await
        .map_err(|e| match e {
            PipelineError::RunNotFound(id) => {
                ApiError::NotFound(format!("Pipeline run {} not found", id))
            }
            PipelineError::ApplicationNotFound(name) => {
                ApiError::NotFound(format!("Application {} not found", name))
            }
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::Store(err) => ApiError::StoreError(err),
        })?;

    Ok(Json(runs))
}
