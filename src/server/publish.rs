use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;

use super::AppState;
use super::agent_id_from_request;
use super::dto::{LatestVersionResponse, PublishRequest, StatusResponse};
use super::response::{ApiError, OptionExt, ResultExt};
use super::upload::authorize_by_names;
use crate::auth::{RequireAuth, authorize};
use crate::events::EventType;
use crate::pathspec;
use crate::types::Permissions;

/// Resolves the one published version of an app; 404 when none is
/// published.
pub async fn get_latest_version(
    State(state): State<Arc<AppState>>,
    Path((project, app)): Path<(String, String)>,
    auth: RequireAuth,
) -> Result<Json<LatestVersionResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    authorize_by_names(&state, &auth, Permissions::PULL, &project, Some(&app))?;

    let project_row = state
        .store
        .get_project_by_name(&project)
        .api_err()?
        .or_not_found("project not found")?;
    let app_row = state
        .store
        .get_app_by_name(project_row.id, &app)
        .api_err()?
        .or_not_found("app not found")?;

    let latest = state
        .store
        .get_latest_published(app_row.id)
        .api_err()?
        .or_not_found("no published version found")?;

    Ok(Json(LatestVersionResponse {
        project,
        app,
        version: latest.hash,
    }))
}

/// Marks a version as published. Publish is single-assignment: every
/// other version of the app is unpublished first.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
    Json(req): Json<PublishRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (project_row, app_row) = resolve(&state, &req)?;
    authorize(
        &state,
        &auth.0,
        Permissions::PROMOTE,
        Some(project_row.id),
        Some(app_row.id),
    )?;

    state
        .store
        .get_version(app_row.id, &req.version)
        .api_err()?
        .or_not_found("version not found")?;

    // Publish also requires the version to be complete in the blob store:
    // the manifest is the commit marker.
    state
        .artifacts
        .get_manifest(&req.project, &req.app, &req.version)
        .await
        .map_err(|_| ApiError::not_found("version not found in storage"))?;

    state.store.unpublish_all(app_row.id).api_err()?;
    state
        .store
        .set_published(app_row.id, &req.version, true)
        .api_err()?;

    state.events.publish(
        EventType::Publish,
        &req.project,
        &req.app,
        Some(&req.version),
        Some(agent_id_from_request(&headers, Some(peer))),
        serde_json::json!({ "target_version": req.version }),
    );

    Ok(Json(StatusResponse::for_version(
        "published",
        &req.project,
        &req.app,
        &req.version,
    )))
}

/// Clears the published flag for one version.
pub async fn unpublish(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
    Json(req): Json<PublishRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (project_row, app_row) = resolve(&state, &req)?;
    authorize(
        &state,
        &auth.0,
        Permissions::PROMOTE,
        Some(project_row.id),
        Some(app_row.id),
    )?;

    state
        .store
        .get_version(app_row.id, &req.version)
        .api_err()?
        .or_not_found("version not found")?;

    state
        .store
        .set_published(app_row.id, &req.version, false)
        .api_err()?;

    state.events.publish(
        EventType::Unpublish,
        &req.project,
        &req.app,
        Some(&req.version),
        Some(agent_id_from_request(&headers, Some(peer))),
        serde_json::json!({ "target_version": req.version }),
    );

    Ok(Json(StatusResponse::for_version(
        "unpublished",
        &req.project,
        &req.app,
        &req.version,
    )))
}

fn resolve(
    state: &AppState,
    req: &PublishRequest,
) -> Result<(crate::types::Project, crate::types::App), ApiError> {
    pathspec::validate_name(&req.project).api_err()?;
    pathspec::validate_name(&req.app).api_err()?;
    pathspec::validate_name(&req.version).api_err()?;

    let project = state
        .store
        .get_project_by_name(&req.project)
        .api_err()?
        .or_not_found("project not found")?;
    let app = state
        .store
        .get_app_by_name(project.id, &req.app)
        .api_err()?
        .or_not_found("app not found")?;
    Ok((project, app))
}
