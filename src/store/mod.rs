mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;
use crate::types::*;

/// Store defines the metadata database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Project operations
    fn create_or_get_project(&self, name: &str) -> Result<Project>;
    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>>;
    fn list_projects(&self, limit: i64, offset: i64) -> Result<Vec<Project>>;
    fn delete_project(&self, name: &str) -> Result<bool>;

    // App operations
    fn create_or_get_app(&self, project_id: i64, name: &str) -> Result<App>;
    fn get_app_by_name(&self, project_id: i64, name: &str) -> Result<Option<App>>;
    fn list_apps(&self, project_id: i64, limit: i64, offset: i64) -> Result<Vec<App>>;
    fn delete_app(&self, project_id: i64, name: &str) -> Result<bool>;

    // Version operations
    fn create_version(&self, app_id: i64, hash: &str) -> Result<Version>;
    fn get_version(&self, app_id: i64, hash: &str) -> Result<Option<Version>>;
    fn list_versions_by_app(&self, app_id: i64, limit: i64, offset: i64) -> Result<Vec<Version>>;
    fn delete_version(&self, app_id: i64, hash: &str) -> Result<bool>;
    fn count_versions_by_app(&self, app_id: i64) -> Result<i64>;
    fn oldest_versions(&self, app_id: i64, n: i64) -> Result<Vec<Version>>;
    fn set_published(&self, app_id: i64, hash: &str, published: bool) -> Result<bool>;
    fn unpublish_all(&self, app_id: i64) -> Result<()>;
    fn get_latest_published(&self, app_id: i64) -> Result<Option<Version>>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Webhook operations
    #[allow(clippy::too_many_arguments)]
    fn create_webhook(
        &self,
        name: &str,
        event_types: &[String],
        url: &str,
        headers: Option<&HashMap<String, String>>,
        enabled: bool,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<Webhook>;
    fn list_webhooks(&self) -> Result<Vec<Webhook>>;
    fn get_webhook(&self, id: i64) -> Result<Option<Webhook>>;
    /// Replaces every mutable field of a webhook.
    #[allow(clippy::too_many_arguments)]
    fn update_webhook(
        &self,
        id: i64,
        name: &str,
        event_types: &[String],
        url: &str,
        headers: Option<&HashMap<String, String>>,
        enabled: bool,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<bool>;
    fn set_webhook_enabled(&self, id: i64, enabled: bool) -> Result<bool>;
    fn delete_webhook(&self, id: i64) -> Result<bool>;
    /// Returns enabled webhooks subscribed to `event` whose scope is
    /// unscoped or matches the event's project/app.
    fn find_webhooks_for_event(
        &self,
        event: &str,
        project_id: Option<i64>,
        app_id: Option<i64>,
    ) -> Result<Vec<Webhook>>;

    // Audit operations
    fn create_audit_entry(
        &self,
        operation: &str,
        project_id: Option<i64>,
        app_id: Option<i64>,
        version: Option<&str>,
        agent_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<()>;
    fn list_audit_entries(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>>;
    fn count_audit_entries(&self, filter: &AuditFilter) -> Result<i64>;
    fn delete_audit_entries_older_than(&self, days: i64) -> Result<usize>;

    // Config operations
    fn get_config(&self, key: &str) -> Result<Option<String>>;
    fn set_config(&self, key: &str, value: &str) -> Result<()>;
    fn get_all_config(&self) -> Result<Vec<(String, String)>>;
}
