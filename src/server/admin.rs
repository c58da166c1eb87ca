use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use tracing::{info, warn};

use super::AppState;
use super::agent_id_from_request;
use super::dto::{StatusResponse, SyncStorageResponse};
use super::response::{ApiError, OptionExt, ResultExt};
use crate::auth::{RequireAdmin, RequireAuth, authorize};
use crate::events::EventType;
use crate::manifest::MANIFEST_FILE;
use crate::pathspec;
use crate::types::Permissions;

/// Deletes a project: cascading metadata delete first (metadata is
/// authoritative), then best-effort blob subtree removal.
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
) -> Result<Json<StatusResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;

    let project_row = state
        .store
        .get_project_by_name(&project)
        .api_err()?
        .or_not_found("project not found")?;
    authorize(
        &state,
        &auth.0,
        Permissions::ADMIN,
        Some(project_row.id),
        None,
    )?;

    state.store.delete_project(&project).api_err()?;

    if let Err(e) = state.artifacts.delete_project(&project).await {
        warn!(%project, "Failed to remove project subtree from storage: {e}");
    }

    state.events.publish(
        EventType::ProjectDelete,
        &project,
        "",
        None,
        Some(agent_id_from_request(&headers, Some(peer))),
        serde_json::json!({}),
    );

    Ok(Json(StatusResponse::new("deleted")))
}

/// Deletes an app and its versions.
pub async fn delete_app(
    State(state): State<Arc<AppState>>,
    Path((project, app)): Path<(String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
) -> Result<Json<StatusResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;

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
    authorize(
        &state,
        &auth.0,
        Permissions::ADMIN,
        Some(project_row.id),
        Some(app_row.id),
    )?;

    state.store.delete_app(project_row.id, &app).api_err()?;

    if let Err(e) = state.artifacts.delete_app(&project, &app).await {
        warn!(%project, %app, "Failed to remove app subtree from storage: {e}");
    }

    state.events.publish(
        EventType::AppDelete,
        &project,
        &app,
        None,
        Some(agent_id_from_request(&headers, Some(peer))),
        serde_json::json!({}),
    );

    Ok(Json(StatusResponse::new("deleted")))
}

/// Deletes one version.
pub async fn delete_version(
    State(state): State<Arc<AppState>>,
    Path((project, app, version)): Path<(String, String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
) -> Result<Json<StatusResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    pathspec::validate_name(&version).api_err()?;

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
    authorize(
        &state,
        &auth.0,
        Permissions::ADMIN,
        Some(project_row.id),
        Some(app_row.id),
    )?;

    if !state.store.delete_version(app_row.id, &version).api_err()? {
        return Err(ApiError::not_found("version not found"));
    }

    if let Err(e) = state.artifacts.delete_version(&project, &app, &version).await {
        warn!(
            %project,
            %app, %version, "Failed to remove version subtree from storage: {e}"
        );
    }

    state.events.publish(
        EventType::VersionDelete,
        &project,
        &app,
        Some(&version),
        Some(agent_id_from_request(&headers, Some(peer))),
        serde_json::json!({}),
    );

    Ok(Json(StatusResponse::for_version(
        "deleted", &project, &app, &version,
    )))
}

/// Reconciles metadata with the blob store (local backing only):
/// upserts projects, apps, and manifest-complete versions found in
/// storage, then removes metadata rows with no storage presence.
/// Idempotent; safe to re-run.
pub async fn sync_storage(
    State(state): State<Arc<AppState>>,
    _auth: RequireAdmin,
) -> Result<Json<SyncStorageResponse>, ApiError> {
    if !state.blobs.is_local() {
        return Err(ApiError::bad_request(
            "sync is only supported for local storage",
        ));
    }

    // Pass 1: scan storage.
    let entries = state.blobs.list("").await.api_err()?;

    let mut storage_projects: BTreeSet<String> = BTreeSet::new();
    let mut storage_apps: BTreeSet<(String, String)> = BTreeSet::new();
    // (project, app) -> versions that carry a manifest
    let mut storage_versions: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for entry in &entries {
        let parts: Vec<&str> = entry.split('/').collect();
        match parts.as_slice() {
            [project] => {
                storage_projects.insert((*project).to_string());
            }
            [project, app] => {
                storage_projects.insert((*project).to_string());
                storage_apps.insert(((*project).to_string(), (*app).to_string()));
            }
            [project, app, version, file] if *file == MANIFEST_FILE => {
                storage_projects.insert((*project).to_string());
                storage_apps.insert(((*project).to_string(), (*app).to_string()));
                storage_versions
                    .entry(((*project).to_string(), (*app).to_string()))
                    .or_default()
                    .insert((*version).to_string());
            }
            _ => {}
        }
    }

    // Pass 2: upsert everything present in storage.
    let mut project_count = 0;
    let mut app_count = 0;
    let mut version_count = 0;

    for project in &storage_projects {
        state.store.create_or_get_project(project).api_err()?;
        project_count += 1;
    }
    for (project, app) in &storage_apps {
        let project_row = state.store.create_or_get_project(project).api_err()?;
        state
            .store
            .create_or_get_app(project_row.id, app)
            .api_err()?;
        app_count += 1;
    }
    for ((project, app), versions) in &storage_versions {
        let project_row = state.store.create_or_get_project(project).api_err()?;
        let app_row = state
            .store
            .create_or_get_app(project_row.id, app)
            .api_err()?;
        for version in versions {
            state.store.create_version(app_row.id, version).api_err()?;
            version_count += 1;
        }
    }

    // Pass 3: drop metadata with no storage presence.
    let projects = state.store.list_projects(i64::MAX, 0).api_err()?;
    for project in projects {
        if !storage_projects.contains(&project.name) {
            info!(project = %project.name, "Removing project absent from storage");
            state.store.delete_project(&project.name).api_err()?;
            continue;
        }

        let apps = state.store.list_apps(project.id, i64::MAX, 0).api_err()?;
        for app in apps {
            let app_key = (project.name.clone(), app.name.clone());
            if !storage_apps.contains(&app_key) {
                info!(
                    project = %project.name,
                    app = %app.name,
                    "Removing app absent from storage"
                );
                state.store.delete_app(project.id, &app.name).api_err()?;
                continue;
            }

            let versions = state
                .store
                .list_versions_by_app(app.id, i64::MAX, 0)
                .api_err()?;
            let present = storage_versions.get(&app_key);
            for version in versions {
                let in_storage = present.is_some_and(|set| set.contains(&version.hash));
                if !in_storage {
                    info!(
                        project = %project.name,
                        app = %app.name,
                        version = %version.hash,
                        "Removing version absent from storage"
                    );
                    state.store.delete_version(app.id, &version.hash).api_err()?;
                }
            }
        }
    }

    Ok(Json(SyncStorageResponse {
        message: "sync completed".to_string(),
        projects: project_count,
        apps: app_count,
        versions: version_count,
    }))
}
