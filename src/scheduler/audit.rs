use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{CONFIG_AUDIT_RETENTION_DAYS, DEFAULT_AUDIT_RETENTION_DAYS, MaintenanceTask};
use crate::error::{Error, Result};
use crate::store::Store;

/// Trims audit log entries older than `audit_log_retention_days`.
pub struct AuditTrimTask {
    store: Arc<dyn Store>,
}

impl AuditTrimTask {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MaintenanceTask for AuditTrimTask {
    fn name(&self) -> &'static str {
        "audit-log-trim"
    }

    async fn run(&self) -> Result<()> {
        let days: i64 = self
            .store
            .get_config(CONFIG_AUDIT_RETENTION_DAYS)?
            .unwrap_or_else(|| DEFAULT_AUDIT_RETENTION_DAYS.to_string())
            .parse()
            .map_err(|e| Error::Config(format!("invalid {CONFIG_AUDIT_RETENTION_DAYS}: {e}")))?;

        let deleted = self.store.delete_audit_entries_older_than(days)?;
        if deleted > 0 {
            info!(deleted, days, "Trimmed audit log entries");
        }
        Ok(())
    }
}
