use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinSet;
use tracing::debug;

use super::client::ApiClient;
use super::progress::ProgressSink;
use crate::error::{Error, Result};
use crate::manifest::{self, Manifest};

#[derive(Debug)]
pub struct PushOutcome {
    pub manifest: Manifest,
    pub upload_id: String,
}

struct UploadTask {
    rel_path: String,
    local_path: PathBuf,
}

/// Pushes a directory tree as a new version.
///
/// Walks the tree into a manifest, reserves the version with upload-init,
/// streams every file through a bounded worker pool, and commits with
/// upload-finish only when the pool joins with zero errors.
#[allow(clippy::too_many_arguments)]
pub async fn push(
    client: &ApiClient,
    project: &str,
    app: &str,
    version: &str,
    source: &Path,
    ignore: &[String],
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
) -> Result<PushOutcome> {
    let source = source
        .canonicalize()
        .map_err(|e| Error::Config(format!("path does not exist: {}: {e}", source.display())))?;

    let git_commit = detect_git_commit(&source);
    let manifest = manifest::generate(
        project,
        app,
        version,
        &source,
        ignore,
        super::BUILDER_NAME,
        git_commit,
    )
    .await?;

    let init = client
        .init_upload(project, app, version, manifest.files.len())
        .await?;
    debug!(upload_id = %init.upload_id, "Upload session reserved");

    let tasks: Vec<UploadTask> = manifest
        .files
        .iter()
        .map(|f| UploadTask {
            rel_path: f.path.clone(),
            local_path: source.join(&f.path),
        })
        .collect();
    progress.begin(tasks.len() as u64);

    run_pool(tasks, concurrency, progress, {
        let client = client.clone();
        let project = project.to_string();
        let app = app.to_string();
        let version = version.to_string();
        move |task: UploadTask| {
            let client = client.clone();
            let project = project.clone();
            let app = app.clone();
            let version = version.clone();
            async move {
                client
                    .upload_file(&project, &app, &version, &task.rel_path, &task.local_path)
                    .await
                    .map_err(|e| Error::transfer(task.rel_path, e))
            }
        }
    })
    .await?;

    client.finish_upload(project, app, version, &manifest).await?;

    Ok(PushOutcome {
        manifest,
        upload_id: init.upload_id,
    })
}

/// Runs tasks through a fixed pool of `concurrency` workers sharing one
/// queue. The first error stops the pool: running workers finish their
/// current task but pick up no new ones, and the error propagates after
/// join.
pub(super) async fn run_pool<T, F, Fut>(
    tasks: Vec<T>,
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
    work: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    if tasks.is_empty() {
        return Ok(());
    }

    let queue = Arc::new(std::sync::Mutex::new(
        tasks.into_iter().collect::<std::collections::VecDeque<T>>(),
    ));
    let failed = Arc::new(AtomicBool::new(false));
    let first_error: Arc<std::sync::Mutex<Option<Error>>> =
        Arc::new(std::sync::Mutex::new(None));

    let workers = concurrency.max(1);
    let mut join_set = JoinSet::new();

    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let failed = Arc::clone(&failed);
        let first_error = Arc::clone(&first_error);
        let progress = Arc::clone(&progress);
        let work = work.clone();

        join_set.spawn(async move {
            loop {
                if failed.load(Ordering::SeqCst) {
                    break;
                }
                let task = {
                    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                    queue.pop_front()
                };
                let Some(task) = task else { break };

                match work(task).await {
                    Ok(()) => progress.advance(1),
                    Err(e) => {
                        let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        failed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(Error::Config(format!("worker panicked: {e}")));
            }
        }
    }
    progress.finish();

    let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
    match slot.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Best-effort commit id of the repository containing the pushed tree.
fn detect_git_commit(path: &Path) -> Option<String> {
    let repo = git2::Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}
