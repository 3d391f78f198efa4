//! Application API Handlers
//!
//! HTTP endpoints for application management, manual sync and status.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use capstan_core::domain::application::Application;
use capstan_core::dto::application::CreateApplication;
use capstan_core::dto::status::StatusReport;
use capstan_core::dto::sync::{SyncReport, SyncRequest};
use serde::Deserialize;

use crate::api::ControllerState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::application_service::{self, ApplicationError};
use crate::service::status_service::{self, StatusError};

/// POST /application/create
/// Register a new application and start tracking it
pub async fn create_application(
    State(state): State<ControllerState>,
    Json(req): Json<CreateApplication>,
) -> ApiResult<Json<Application>> {
    tracing::info!("Creating application: {}", req.name);

    let app = application_service::create_application(
        state.store.as_ref(),
        &state.engine,
        req,
    )
    .await
    .map_err(|e| match e {
        ApplicationError::NotFound(name) => {
            ApiError::NotFound(format!("Application {} not found", name))
        }
        ApplicationError::AlreadyExists(name) => {
            ApiError::Conflict(format!("Application {} already exists", name))
        }
        ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
        ApplicationError::StoreError(err) => ApiError::StoreError(err),
        ApplicationError::EngineError(err) => {
            ApiError::InternalError(err.to_string())
        }
    })?;

    Ok(Json(app))
}

/// GET /application/list
/// List all tracked applications
pub async fn list_applications(
    State(state): State<ControllerState>,
) -> ApiResult<Json<Vec<Application>>> {
    tracing::debug!("Listing all applications");

    let apps = application_service::list_applications(state.store.as_ref())
        .await
        .map_err(|e| match e {
            ApplicationError::NotFound(name) => {
                ApiError::NotFound(format!("Application {} not found", name))
            }
            ApplicationError::AlreadyExists(name) => ApiError::Conflict(
                format!("Application {} already exists", name),
            ),
            ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
            ApplicationError::StoreError(err) => ApiError::StoreError(err),
            ApplicationError::EngineError(err) => {
                ApiError::InternalError(err.to_string())
            }
        })?;

    Ok(Json(apps))
}

/// GET /application/{name}
/// Get an application by name
pub async fn get_application(
    State(state): State<ControllerState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Application>> {
    tracing::debug!("Getting application: {}", name);

    let app =
        application_service::get_application(state.store.as_ref(), &name)
            .await
            .map_err(|e| match e {
                ApplicationError::NotFound(name) => ApiError::NotFound(
                    format!("Application {} not found", name),
                ),
                ApplicationError::AlreadyExists(name) => ApiError::Conflict(
                    format!("Application {} already exists", name),
                ),
                ApplicationError::ValidationError(msg) => {
                    ApiError::BadRequest(msg)
                }
                ApplicationError::StoreError(err) => ApiError::StoreError(err),
                ApplicationError::EngineError(err) => {
                    ApiError::InternalError(err.to_string())
                }
            })?;

    Ok(Json(app))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Also delete the live objects the application owns
    #[serde(default)]
    pub cascade: bool,
}

/// DELETE /application/{name}
/// Stop tracking an application and delete its records
pub async fn delete_application(
    State(state): State<ControllerState>,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        "Deleting application: {} (cascade: {})",
        name,
        params.cascade
    );

    application_service::delete_application(
        state.store.as_ref(),
        &state.engine,
        &name,
        params.cascade,
    )
    .await
    .map_err(|e| match e {
        ApplicationError::NotFound(name) => {
            ApiError::NotFound(format!("Application {} not found", name))
        }
        ApplicationError::AlreadyExists(name) => {
            ApiError::Conflict(format!("Application {} already exists", name))
        }
        ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
        ApplicationError::StoreError(err) => ApiError::StoreError(err),
        ApplicationError::EngineError(err) => {
            ApiError::InternalError(err.to_string())
        }
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /application/{name}/sync
/// Run one reconciliation pass and return its report
pub async fn sync_application(
    State(state): State<ControllerState>,
    Path(name): Path<String>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<Json<SyncReport>> {
    tracing::info!("Sync requested for application: {}", name);

    let report = application_service::sync_application(
        state.store.as_ref(),
        &state.engine,
        &name,
        req,
    )
    .await
    .map_err(|e| match e {
        ApplicationError::NotFound(name) => {
            ApiError::NotFound(format!("Application {} not found", name))
        }
        ApplicationError::AlreadyExists(name) => {
            ApiError::Conflict(format!("Application {} already exists", name))
        }
        ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
        ApplicationError::StoreError(err) => ApiError::StoreError(err),
        ApplicationError::EngineError(err) => {
            ApiError::InternalError(err.to_string())
        }
    })?;

    Ok(Json(report))
}

/// GET /application/{name}/status
/// Aggregated status: definition, sync record, latest pipeline run
pub async fn get_status(
    State(state): State<ControllerState>,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusReport>> {
    tracing::debug!("Getting status for application: {}", name);

    let report = status_service::get_status(state.store.as_ref(), &name)
        .await
        .map_err(|e| match e {
            StatusError::NotFound(name) => {
                ApiError::NotFound(format!("Application {} not found", name))
            }
            StatusError::StoreError(err) => ApiError::StoreError(err),
        })?;

    Ok(Json(report))
}
