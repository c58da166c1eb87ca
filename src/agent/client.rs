use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::digest;
use crate::error::{Error, Result};
use crate::manifest::Manifest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 200;

#[derive(Debug, Serialize)]
struct UploadInitRequest<'a> {
    project: &'a str,
    app: &'a str,
    version: &'a str,
    file_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct UploadInitResponse {
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
struct UploadFinishRequest<'a> {
    project: &'a str,
    app: &'a str,
    version: &'a str,
    manifest: &'a Manifest,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    project: &'a str,
    app: &'a str,
    version: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LatestVersionResponse {
    pub project: String,
    pub app: String,
    pub version: String,
}

/// The manifest as served by the server's manifest endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteManifest {
    pub project: String,
    pub app: String,
    pub version: String,
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    /// Older servers serialize this field as `hash`.
    #[serde(alias = "hash")]
    pub sha256: String,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// The agent's API client. The transport is tuned for many concurrent
/// uploads against a single host.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(server_url: &str, token: &str) -> Result<Self> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(Error::Config("token is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()?;

        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error.unwrap_or_else(|| "server error".to_string()),
            Err(_) => "server error".to_string(),
        };
        Error::Api { status, message }
    }

    pub async fn init_upload(
        &self,
        project: &str,
        app: &str,
        version: &str,
        file_count: usize,
    ) -> Result<UploadInitResponse> {
        let response = self
            .client
            .post(self.url("/upload/init"))
            .bearer_auth(&self.token)
            .json(&UploadInitRequest {
                project,
                app,
                version,
                file_count,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Streams one file body as multipart form data with its
    /// tree-relative path in the `path` field.
    pub async fn upload_file(
        &self,
        project: &str,
        app: &str,
        version: &str,
        rel_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let file = File::open(local_path).await?;
        let size = file.metadata().await?.len();

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size).file_name(file_name);
        let form = Form::new().text("path", rel_path.to_string()).part("file", part);

        let response = self
            .client
            .post(self.url(&format!("/file/{project}/{app}/{version}")))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    pub async fn finish_upload(
        &self,
        project: &str,
        app: &str,
        version: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url("/upload/finish"))
            .bearer_auth(&self.token)
            .json(&UploadFinishRequest {
                project,
                app,
                version,
                manifest,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    pub async fn get_manifest(
        &self,
        project: &str,
        app: &str,
        version: &str,
    ) -> Result<RemoteManifest> {
        let response = self
            .client
            .get(self.url(&format!("/manifest/{project}/{app}/{version}")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn latest_version(&self, project: &str, app: &str) -> Result<LatestVersionResponse> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{project}/apps/{app}/latest")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn publish(&self, project: &str, app: &str, version: &str) -> Result<()> {
        self.post_publish("/publish", project, app, version).await
    }

    pub async fn unpublish(&self, project: &str, app: &str, version: &str) -> Result<()> {
        self.post_publish("/unpublish", project, app, version).await
    }

    async fn post_publish(
        &self,
        endpoint: &str,
        project: &str,
        app: &str,
        version: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.token)
            .json(&PublishRequest {
                project,
                app,
                version,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    /// Downloads one file, skipping it when the local copy already
    /// matches and resuming with a ranged GET when a shorter partial
    /// copy exists.
    pub async fn download_file(
        &self,
        project: &str,
        app: &str,
        version: &str,
        rel_path: &str,
        local_path: &Path,
        expected_hash: &str,
        expected_size: i64,
    ) -> Result<()> {
        let check = digest::file_matches(local_path, expected_hash).await?;

        if check.exists && check.matches {
            return Ok(());
        }
        if check.exists && check.size > 0 && check.size < expected_size {
            return self
                .resume_download(
                    project,
                    app,
                    version,
                    rel_path,
                    local_path,
                    check.size,
                    expected_size,
                )
                .await;
        }
        if check.exists {
            // Wrong content at full length; start over.
            tokio::fs::remove_file(local_path).await?;
        }

        self.full_download(project, app, version, rel_path, local_path)
            .await
    }

    fn file_endpoint(&self, project: &str, app: &str, version: &str) -> String {
        self.url(&format!("/file/{project}/{app}/{version}"))
    }

    async fn full_download(
        &self,
        project: &str,
        app: &str,
        version: &str,
        rel_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let response = self
            .client
            .get(self.file_endpoint(project, app, version))
            .query(&[("path", rel_path)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(local_path).await?;
        let mut response = response;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn resume_download(
        &self,
        project: &str,
        app: &str,
        version: &str,
        rel_path: &str,
        local_path: &Path,
        start: i64,
        expected_size: i64,
    ) -> Result<()> {
        let range = if expected_size > 0 && start < expected_size {
            format!("bytes={start}-{}", expected_size - 1)
        } else {
            format!("bytes={start}-")
        };

        let response = self
            .client
            .get(self.file_endpoint(project, app, version))
            .query(&[("path", rel_path)])
            .bearer_auth(&self.token)
            .header(reqwest::header::RANGE, range)
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let mut file = OpenOptions::new().append(true).open(local_path).await?;
                let mut response = response;
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                Ok(())
            }
            // Server cannot serve ranges; take the whole body instead.
            StatusCode::OK => {
                self.full_download(project, app, version, rel_path, local_path)
                    .await
            }
            _ => Err(Self::error_from_response(response).await),
        }
    }

    /// Existence probe on the server.
    pub async fn file_exists(
        &self,
        project: &str,
        app: &str,
        version: &str,
        rel_path: &str,
    ) -> Result<bool> {
        let response = self
            .client
            .head(self.file_endpoint(project, app, version))
            .query(&[("path", rel_path)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
