//! Operation events: audit recording plus outbound webhook fan-out.
//!
//! The audit write is the synchronous commit point; webhook delivery is
//! asynchronous and best-effort. Neither ever fails the request that
//! produced the event.

mod webhook;

pub use webhook::WebhookSender;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Push,
    Pull,
    Promote,
    Publish,
    Unpublish,
    Rollback,
    Delete,
    ProjectDelete,
    AppDelete,
    VersionDelete,
    TokenCreate,
    TokenDelete,
    WebhookFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Push => "push",
            EventType::Pull => "pull",
            EventType::Promote => "promote",
            EventType::Publish => "publish",
            EventType::Unpublish => "unpublish",
            EventType::Rollback => "rollback",
            EventType::Delete => "delete",
            EventType::ProjectDelete => "project_delete",
            EventType::AppDelete => "app_delete",
            EventType::VersionDelete => "version_delete",
            EventType::TokenCreate => "token_create",
            EventType::TokenDelete => "token_delete",
            EventType::WebhookFailed => "webhook_failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON body delivered to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub project: String,
    pub app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// Records events in the audit log and fans them out to subscribed
/// webhooks.
pub struct EventPublisher {
    store: Arc<dyn Store>,
    sender: WebhookSender,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sender: WebhookSender::new(),
        }
    }

    /// Publishes an event: writes the audit entry synchronously, then
    /// invokes each matching webhook on its own task.
    pub fn publish(
        self: &Arc<Self>,
        event_type: EventType,
        project: &str,
        app: &str,
        version: Option<&str>,
        agent_id: Option<String>,
        metadata: Value,
    ) {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            event_type,
            project: project.to_string(),
            app: app.to_string(),
            version: version.map(str::to_string),
            agent_id,
            metadata,
            timestamp: Utc::now(),
        };

        let (project_id, app_id) = self.resolve_ids(&event);

        if let Err(e) = self.store.create_audit_entry(
            event_type.as_str(),
            project_id,
            app_id,
            event.version.as_deref(),
            event.agent_id.as_deref(),
            Some(&event.metadata),
        ) {
            warn!(event = %event_type, "Failed to record audit entry: {e}");
        }

        let webhooks = match self
            .store
            .find_webhooks_for_event(event_type.as_str(), project_id, app_id)
        {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!(event = %event_type, "Failed to look up webhooks: {e}");
                return;
            }
        };

        for webhook in webhooks {
            let publisher = Arc::clone(self);
            let event = event.clone();
            tokio::spawn(async move {
                publisher.deliver(webhook, event).await;
            });
        }
    }

    async fn deliver(&self, webhook: crate::types::Webhook, event: Event) {
        match self
            .sender
            .send(&webhook.url, webhook.headers.as_ref(), &event)
            .await
        {
            Ok(()) => {
                tracing::debug!(webhook = webhook.id, url = %webhook.url, "Webhook delivered");
            }
            Err(e) => {
                warn!(webhook = webhook.id, url = %webhook.url, "Webhook failed: {e}");
                let metadata = serde_json::json!({
                    "webhook_id": webhook.id,
                    "url": webhook.url,
                    "error": e.to_string(),
                });
                if let Err(audit_err) = self.store.create_audit_entry(
                    EventType::WebhookFailed.as_str(),
                    webhook.project_id,
                    webhook.app_id,
                    event.version.as_deref(),
                    event.agent_id.as_deref(),
                    Some(&metadata),
                ) {
                    warn!("Failed to record webhook_failed audit entry: {audit_err}");
                }
            }
        }
    }

    /// Resolves project/app names to metadata ids, creating rows on demand
    /// the way every other reference to a name does.
    fn resolve_ids(&self, event: &Event) -> (Option<i64>, Option<i64>) {
        if event.project.is_empty() {
            return (None, None);
        }
        let project = match self.store.create_or_get_project(&event.project) {
            Ok(project) => project,
            Err(_) => return (None, None),
        };
        if event.app.is_empty() {
            return (Some(project.id), None);
        }
        let app_id = self
            .store
            .create_or_get_app(project.id, &event.app)
            .map(|a| a.id)
            .ok();
        (Some(project.id), app_id)
    }
}
