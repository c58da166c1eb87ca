//! Unauthenticated read-only listing endpoints, routed only when the
//! server runs with `public_listing` enabled.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};

use super::AppState;
use super::dto::VersionSummary;
use super::response::{ApiError, OptionExt, ResultExt};
use crate::pathspec;

const LIST_PAGE_SIZE: i64 = 1000;

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let projects = state.store.list_projects(LIST_PAGE_SIZE, 0).api_err()?;
    Ok(Json(projects.into_iter().map(|p| p.name).collect()))
}

pub async fn list_apps(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    let project_row = state
        .store
        .get_project_by_name(&project)
        .api_err()?
        .or_not_found("project not found")?;
    let apps = state
        .store
        .list_apps(project_row.id, LIST_PAGE_SIZE, 0)
        .api_err()?;
    Ok(Json(apps.into_iter().map(|a| a.name).collect()))
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((project, app)): Path<(String, String)>,
) -> Result<Json<Vec<VersionSummary>>, ApiError> {
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
    let versions = state
        .store
        .list_versions_by_app(app_row.id, LIST_PAGE_SIZE, 0)
        .api_err()?;
    Ok(Json(
        versions
            .into_iter()
            .map(|v| VersionSummary {
                version: v.hash,
                is_published: v.is_published,
                created_at: v.created_at,
            })
            .collect(),
    ))
}
