use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::HeaderMap;
use tokio::io::AsyncRead;

use super::AppState;
use super::agent_id_from_request;
use super::dto::{
    UploadFileResponse, UploadFinishRequest, UploadInitRequest, UploadInitResponse,
};
use super::response::{ApiError, ResultExt};
use crate::auth::{RequireAuth, authorize};
use crate::digest;
use crate::events::EventType;
use crate::pathspec;
use crate::storage::ArtifactManager;
use crate::types::Permissions;

/// Reserves a version for upload. Destructive on re-push: an existing
/// version's blobs and metadata row are dropped so the upload starts from
/// an empty subtree.
pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<UploadInitRequest>,
) -> Result<Json<UploadInitResponse>, ApiError> {
    pathspec::validate_name(&req.project).api_err()?;
    pathspec::validate_name(&req.app).api_err()?;
    pathspec::validate_name(&req.version).api_err()?;

    let project = state.store.create_or_get_project(&req.project).api_err()?;
    let app = state
        .store
        .create_or_get_app(project.id, &req.app)
        .api_err()?;
    authorize(
        &state,
        &auth.0,
        Permissions::PUSH,
        Some(project.id),
        Some(app.id),
    )?;

    if state
        .artifacts
        .manifest_exists(&req.project, &req.app, &req.version)
        .await
        .api_err()?
    {
        state
            .artifacts
            .delete_version(&req.project, &req.app, &req.version)
            .await
            .api_err()?;
        // The metadata row may legitimately be missing for an orphaned
        // subtree; ignore that.
        let _ = state.store.delete_version(app.id, &req.version);
    }

    Ok(Json(UploadInitResponse {
        upload_id: format!("{}-{}-{}", req.project, req.app, req.version),
    }))
}

/// Receives one file of a version as multipart form data with a `path`
/// field and a `file` part. The version string in the URL is the version
/// identifier, not a content hash; the returned digest is informational
/// and nothing is verified server-side.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path((project, app, version)): Path<(String, String, String)>,
    auth: RequireAuth,
    mut multipart: Multipart,
) -> Result<Json<UploadFileResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    pathspec::validate_name(&version).api_err()?;
    authorize_by_names(&state, &auth, Permissions::PUSH, &project, Some(&app))?;

    let mut file_path: Option<String> = None;
    let mut body: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("path") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid path field: {e}")))?;
                file_path = Some(value);
            }
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file part: {e}")))?;
                body = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let file_path = file_path.ok_or_else(|| ApiError::bad_request("path field is required"))?;
    let body = body.ok_or_else(|| ApiError::bad_request("file part is required"))?;

    pathspec::validate_path(&file_path).api_err()?;

    let hash = digest::digest_bytes(&body);
    let size = body.len() as i64;

    let key = ArtifactManager::file_key(&project, &app, &version, &file_path);
    let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(std::io::Cursor::new(body));
    state.blobs.put(&key, reader, size).await.api_err()?;

    Ok(Json(UploadFileResponse {
        status: "uploaded",
        hash,
        size,
    }))
}

/// Commits a version: writes the manifest (the version's commit marker)
/// and upserts the metadata row. Must only be called after every file
/// upload succeeded.
pub async fn finish_upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
    Json(req): Json<UploadFinishRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    pathspec::validate_name(&req.project).api_err()?;
    pathspec::validate_name(&req.app).api_err()?;
    pathspec::validate_name(&req.version).api_err()?;
    for file in &req.manifest.files {
        pathspec::validate_path(&file.path).api_err()?;
    }

    let project = state.store.create_or_get_project(&req.project).api_err()?;
    let app = state
        .store
        .create_or_get_app(project.id, &req.app)
        .api_err()?;
    authorize(
        &state,
        &auth.0,
        Permissions::PUSH,
        Some(project.id),
        Some(app.id),
    )?;

    let manifest_bytes = req.manifest.serialize().api_err()?;
    state
        .artifacts
        .store_manifest(&req.project, &req.app, &req.version, manifest_bytes)
        .await
        .api_err()?;

    state.store.create_version(app.id, &req.version).api_err()?;

    let mut metadata = serde_json::json!({
        "file_count": req.manifest.files.len(),
        "total_size": req.manifest.total_size(),
    });
    if let Some(git_commit) = &req.manifest.git_commit {
        metadata["git_commit"] = serde_json::Value::String(git_commit.clone());
    }
    if !req.manifest.builder.is_empty() {
        metadata["builder"] = serde_json::Value::String(req.manifest.builder.clone());
    }

    state.events.publish(
        EventType::Push,
        &req.project,
        &req.app,
        Some(&req.version),
        Some(agent_id_from_request(&headers, Some(peer))),
        metadata,
    );

    Ok(Json(serde_json::json!({
        "status": "completed",
        "version": req.version,
    })))
}

/// Resolves scope ids by name for operations that must not upsert.
/// Missing rows resolve to unscoped ids, which strict mode then rejects
/// for scoped tokens.
pub(super) fn authorize_by_names(
    state: &AppState,
    auth: &RequireAuth,
    required: Permissions,
    project: &str,
    app: Option<&str>,
) -> Result<(), ApiError> {
    if !state.strict_token_scope {
        return Ok(());
    }
    let project_row = state.store.get_project_by_name(project).api_err()?;
    let app_row = match (&project_row, app) {
        (Some(p), Some(app)) => state.store.get_app_by_name(p.id, app).api_err()?,
        _ => None,
    };
    authorize(
        state,
        &auth.0,
        required,
        project_row.map(|p| p.id),
        app_row.map(|a| a.id),
    )?;
    Ok(())
}
