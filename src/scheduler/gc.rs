use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::MaintenanceTask;
use crate::error::Result;
use crate::storage::ArtifactManager;
use crate::store::Store;

const LIST_PAGE_SIZE: i64 = 1000;

/// Garbage-collects version subtrees the rest of the system treats as
/// non-existent: versions without a readable manifest (interrupted
/// uploads) and manifest-complete versions with no metadata row
/// (orphans).
pub struct IncompleteGcTask {
    store: Arc<dyn Store>,
    artifacts: ArtifactManager,
}

impl IncompleteGcTask {
    pub fn new(store: Arc<dyn Store>, artifacts: ArtifactManager) -> Self {
        Self { store, artifacts }
    }

    async fn sweep_app(&self, project_name: &str, app_name: &str, app_id: i64) -> Result<()> {
        let blob_versions = self.artifacts.list_versions(project_name, app_name).await?;

        for version in blob_versions {
            let complete = self
                .artifacts
                .get_manifest(project_name, app_name, &version)
                .await
                .is_ok();

            let reason = if !complete {
                Some("incomplete upload")
            } else if self.store.get_version(app_id, &version)?.is_none() {
                Some("orphaned version")
            } else {
                None
            };

            if let Some(reason) = reason {
                info!(
                    project = project_name,
                    app = app_name,
                    %version, reason, "Removing version subtree"
                );
                if let Err(e) = self
                    .artifacts
                    .delete_version(project_name, app_name, &version)
                    .await
                {
                    warn!(
                        project = project_name,
                        app = app_name,
                        %version, "Failed to remove version subtree: {e}"
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MaintenanceTask for IncompleteGcTask {
    fn name(&self) -> &'static str {
        "incomplete-version-gc"
    }

    async fn run(&self) -> Result<()> {
        for project in self.store.list_projects(LIST_PAGE_SIZE, 0)? {
            for app in self.store.list_apps(project.id, LIST_PAGE_SIZE, 0)? {
                if let Err(e) = self.sweep_app(&project.name, &app.name, app.id).await {
                    warn!(project = %project.name, app = %app.name, "GC failed: {e}");
                }
            }
        }
        Ok(())
    }
}
