use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use super::AppState;
use super::agent_id_from_request;
use super::dto::{FileQuery, ManifestResponse};
use super::response::{ApiError, ResultExt};
use super::upload::authorize_by_names;
use crate::auth::RequireAuth;
use crate::events::EventType;
use crate::pathspec;
use crate::storage::ArtifactManager;
use crate::types::Permissions;

/// Returns the parsed manifest for a version and records the pull event.
/// The audit entry is written here, once per version, rather than per
/// downloaded file.
pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
    Path((project, app, version)): Path<(String, String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: RequireAuth,
) -> Result<Json<ManifestResponse>, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    pathspec::validate_name(&version).api_err()?;
    authorize_by_names(&state, &auth, Permissions::PULL, &project, Some(&app))?;

    let manifest = state
        .artifacts
        .get_manifest(&project, &app, &version)
        .await
        .api_err()?;

    let mut metadata = serde_json::json!({
        "file_count": manifest.files.len(),
        "total_size": manifest.total_size(),
    });
    if let Some(git_commit) = &manifest.git_commit {
        metadata["git_commit"] = serde_json::Value::String(git_commit.clone());
    }
    if !manifest.builder.is_empty() {
        metadata["builder"] = serde_json::Value::String(manifest.builder.clone());
    }

    state.events.publish(
        EventType::Pull,
        &project,
        &app,
        Some(&version),
        Some(agent_id_from_request(&headers, Some(peer))),
        metadata,
    );

    Ok(Json(ManifestResponse::from(manifest)))
}

/// Streams one file of a version. Honors `Range: bytes=<start>-[<end>]`
/// when the underlying reader can seek, replying 206 with Content-Range;
/// falls back to a 200 full body otherwise. `Accept-Ranges: bytes` is
/// always advertised.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path((project, app, version)): Path<(String, String, String)>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    auth: RequireAuth,
) -> Result<Response, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    pathspec::validate_name(&version).api_err()?;
    pathspec::validate_path(&query.path).api_err()?;
    authorize_by_names(&state, &auth, Permissions::PULL, &project, Some(&app))?;

    let key = ArtifactManager::file_key(&project, &app, &version, &query.path);
    let mut reader = state.blobs.get(&key).await.api_err()?;
    let size = reader.size();

    if let Some(range_header) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        if let Some((start, end)) = parse_range(range_header) {
            if start >= size as u64 {
                return Err(ApiError::range_not_satisfiable(format!(
                    "range start {start} beyond size {size}"
                )));
            }

            let seekable = reader
                .seek_start(start)
                .await
                .map_err(|e| ApiError::internal(format!("seek failed for {key}: {e}")))?;

            if seekable {
                let end = end
                    .map(|e| e.min(size as u64 - 1))
                    .unwrap_or(size as u64 - 1);
                let length = end - start + 1;

                let limited = reader.take(length);
                let body = Body::from_stream(ReaderStream::new(limited));
                return Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .header(header::CONTENT_LENGTH, length)
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {start}-{end}/{size}"),
                    )
                    .header(header::ACCEPT_RANGES, "bytes")
                    .body(body)
                    .map_err(|e| ApiError::internal(format!("response build failed: {e}")));
            }
            // Reader cannot seek; fall through to a full-body 200.
        }
    }

    let body = Body::from_stream(ReaderStream::new(reader));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(body)
        .map_err(|e| ApiError::internal(format!("response build failed: {e}")))
}

/// Existence probe for a file of a version.
pub async fn head_file(
    State(state): State<Arc<AppState>>,
    Path((project, app, version)): Path<(String, String, String)>,
    Query(query): Query<FileQuery>,
    auth: RequireAuth,
) -> Result<Response, ApiError> {
    pathspec::validate_name(&project).api_err()?;
    pathspec::validate_name(&app).api_err()?;
    pathspec::validate_name(&version).api_err()?;
    pathspec::validate_path(&query.path).api_err()?;
    authorize_by_names(&state, &auth, Permissions::PULL, &project, Some(&app))?;

    let key = ArtifactManager::file_key(&project, &app, &version, &query.path);
    if !state.blobs.exists(&key).await.api_err()? {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(StatusCode::OK.into_response())
}

/// Parses `bytes=<start>-[<end>]`. Returns (start, inclusive end).
fn parse_range(header: &str) -> Option<(u64, Option<u64>)> {
    let ranges = header.strip_prefix("bytes=")?;
    let (start, end) = ranges.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        e => Some(e.parse::<u64>().ok()?),
    };
    if let Some(end) = end {
        if end < start {
            return None;
        }
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::parse_range;

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range("bytes=0-1023"), Some((0, Some(1023))));
        assert_eq!(parse_range("bytes=1024-"), Some((1024, None)));
        assert_eq!(
            parse_range("bytes=1048576-3145727"),
            Some((1048576, Some(3145727)))
        );
    }

    #[test]
    fn test_parse_range_rejects_malformed() {
        assert_eq!(parse_range("bites=0-10"), None);
        assert_eq!(parse_range("bytes=10-5"), None);
        assert_eq!(parse_range("bytes=abc-"), None);
    }
}
