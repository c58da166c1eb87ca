use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

#[derive(Debug, Deserialize)]
pub struct UploadInitRequest {
    pub project: String,
    pub app: String,
    pub version: String,
    #[serde(default)]
    pub file_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadInitResponse {
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFinishRequest {
    pub project: String,
    pub app: String,
    pub version: String,
    pub manifest: Manifest,
}

#[derive(Debug, Serialize)]
pub struct UploadFileResponse {
    pub status: &'static str,
    /// Server-computed SHA-256 of the received body. Informational: the
    /// server does not verify uploads; pullers verify against the manifest.
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub project: String,
    pub app: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    pub build_time: String,
    pub builder: String,
    pub files: Vec<ManifestFileResponse>,
}

#[derive(Debug, Serialize)]
pub struct ManifestFileResponse {
    pub path: String,
    pub sha256: String,
    /// Legacy alias of `sha256` kept for older agents.
    pub hash: String,
    pub size: i64,
}

impl From<Manifest> for ManifestResponse {
    fn from(manifest: Manifest) -> Self {
        ManifestResponse {
            project: manifest.project,
            app: manifest.app,
            version: manifest.version,
            git_commit: manifest.git_commit,
            build_time: manifest.build_time,
            builder: manifest.builder,
            files: manifest
                .files
                .into_iter()
                .map(|f| ManifestFileResponse {
                    path: f.path,
                    sha256: f.sha256.clone(),
                    hash: f.sha256,
                    size: f.size,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestVersionResponse {
    pub project: String,
    pub app: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub project: String,
    pub app: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StatusResponse {
    pub fn new(status: &'static str) -> Self {
        Self {
            status,
            project: None,
            app: None,
            version: None,
        }
    }

    pub fn for_version(status: &'static str, project: &str, app: &str, version: &str) -> Self {
        Self {
            status,
            project: Some(project.to_string()),
            app: Some(app.to_string()),
            version: Some(version.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStorageResponse {
    pub message: String,
    pub projects: usize,
    pub apps: usize,
    pub versions: usize,
}

#[derive(Debug, Serialize)]
pub struct VersionSummary {
    pub version: String,
    pub is_published: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
