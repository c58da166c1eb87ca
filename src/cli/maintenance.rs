use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ServerConfig, ServerConfigOverrides};
use crate::scheduler::{AuditTrimTask, IncompleteGcTask, RetentionTask, Scheduler};
use crate::storage::{ArtifactManager, create_store};
use crate::store::Store;

use super::init_store;

/// Runs the three maintenance tasks once against the configured data
/// directory, regardless of the scheduled window.
pub async fn run_maintenance(data_dir: String, config: Option<PathBuf>) -> anyhow::Result<()> {
    let server_config = ServerConfig::load_with_overrides(
        config.as_deref(),
        ServerConfigOverrides {
            data_dir: Some(PathBuf::from(&data_dir)),
            ..Default::default()
        },
    )?;

    let store = init_store(&data_dir)?;
    let blobs = create_store(&server_config.storage_config()).await?;
    let artifacts = ArtifactManager::new(blobs);

    let mut scheduler = Scheduler::new(
        server_config.maintenance_hour,
        server_config.maintenance_window_minutes,
    );
    scheduler.add_task(Arc::new(RetentionTask::new(
        store.clone() as Arc<dyn Store>,
        artifacts.clone(),
    )));
    scheduler.add_task(Arc::new(IncompleteGcTask::new(
        store.clone() as Arc<dyn Store>,
        artifacts.clone(),
    )));
    scheduler.add_task(Arc::new(AuditTrimTask::new(store as Arc<dyn Store>)));

    scheduler.run_all().await;
    Ok(())
}
