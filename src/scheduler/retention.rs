use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{CONFIG_VERSION_RETENTION, DEFAULT_VERSION_RETENTION, MaintenanceTask};
use crate::error::{Error, Result};
use crate::storage::ArtifactManager;
use crate::store::Store;

const LIST_PAGE_SIZE: i64 = 1000;

/// Enforces the per-app version retention limit: versions beyond the
/// `version_retention_limit` newest are removed, blob store first, then
/// metadata.
pub struct RetentionTask {
    store: Arc<dyn Store>,
    artifacts: ArtifactManager,
}

impl RetentionTask {
    pub fn new(store: Arc<dyn Store>, artifacts: ArtifactManager) -> Self {
        Self { store, artifacts }
    }

    async fn cleanup_app(
        &self,
        project_name: &str,
        app_name: &str,
        app_id: i64,
        limit: i64,
    ) -> Result<()> {
        let count = self.store.count_versions_by_app(app_id)?;
        if count <= limit {
            return Ok(());
        }

        let doomed = self.store.oldest_versions(app_id, count - limit)?;
        for version in doomed {
            // Storage first: a version that loses its manifest is dead to
            // readers even if the metadata delete below fails.
            if let Err(e) = self
                .artifacts
                .delete_version(project_name, app_name, &version.hash)
                .await
            {
                warn!(
                    project = project_name,
                    app = app_name,
                    version = %version.hash,
                    "Failed to delete version from storage: {e}"
                );
            }
            if let Err(e) = self.store.delete_version(app_id, &version.hash) {
                warn!(
                    project = project_name,
                    app = app_name,
                    version = %version.hash,
                    "Failed to delete version from metadata: {e}"
                );
            } else {
                info!(
                    project = project_name,
                    app = app_name,
                    version = %version.hash,
                    "Retention removed version"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MaintenanceTask for RetentionTask {
    fn name(&self) -> &'static str {
        "version-retention"
    }

    async fn run(&self) -> Result<()> {
        let limit: i64 = self
            .store
            .get_config(CONFIG_VERSION_RETENTION)?
            .unwrap_or_else(|| DEFAULT_VERSION_RETENTION.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("invalid {CONFIG_VERSION_RETENTION}: {e}")))?;

        for project in self.store.list_projects(LIST_PAGE_SIZE, 0)? {
            for app in self.store.list_apps(project.id, LIST_PAGE_SIZE, 0)? {
                if let Err(e) = self
                    .cleanup_app(&project.name, &app.name, app.id, limit)
                    .await
                {
                    warn!(
                        project = %project.name,
                        app = %app.name,
                        "Retention failed: {e}"
                    );
                }
            }
        }
        Ok(())
    }
}
