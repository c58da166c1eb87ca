use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use super::client::ApiClient;
use super::progress::ProgressSink;
use super::push::run_pool;
use crate::error::{Error, Result};
use crate::pathspec;

#[derive(Debug)]
pub struct PullOutcome {
    /// The version actually pulled, after `latest` resolution.
    pub version: String,
    pub file_count: usize,
    pub total_size: i64,
}

struct DownloadTask {
    rel_path: String,
    local_path: PathBuf,
    expected_hash: String,
    expected_size: i64,
}

/// Pulls a version into a directory.
///
/// An empty or `latest` version resolves through the server's published
/// pointer first. Files already present with a matching digest are
/// skipped; shorter partial files resume with a ranged GET; mismatched
/// files are replaced. Digests are not re-verified after download; a
/// subsequent pull re-stats and heals divergence.
pub async fn pull(
    client: &ApiClient,
    project: &str,
    app: &str,
    version: &str,
    dest: &Path,
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
) -> Result<PullOutcome> {
    let resolved = if version.is_empty() || version == "latest" {
        client.latest_version(project, app).await?.version
    } else {
        version.to_string()
    };

    let manifest = client.get_manifest(project, app, &resolved).await?;

    fs::create_dir_all(dest).await?;

    let mut total_size = 0;
    let mut tasks = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        // Never let a hostile manifest write outside the target tree.
        pathspec::validate_path(&file.path)
            .map_err(|e| Error::transfer(file.path.clone(), e))?;
        total_size += file.size;
        tasks.push(DownloadTask {
            rel_path: file.path.clone(),
            local_path: dest.join(&file.path),
            expected_hash: file.sha256.clone(),
            expected_size: file.size,
        });
    }
    let file_count = tasks.len();
    progress.begin(file_count as u64);

    run_pool(tasks, concurrency, progress, {
        let client = client.clone();
        let project = project.to_string();
        let app = app.to_string();
        let version = resolved.clone();
        move |task: DownloadTask| {
            let client = client.clone();
            let project = project.clone();
            let app = app.clone();
            let version = version.clone();
            async move {
                client
                    .download_file(
                        &project,
                        &app,
                        &version,
                        &task.rel_path,
                        &task.local_path,
                        &task.expected_hash,
                        task.expected_size,
                    )
                    .await
                    .map_err(|e| Error::transfer(task.rel_path, e))
            }
        }
    })
    .await?;

    Ok(PullOutcome {
        version: resolved,
        file_count,
        total_size,
    })
}
