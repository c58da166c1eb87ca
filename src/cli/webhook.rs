use std::collections::HashMap;

use crate::store::Store;

use super::init_store;

#[allow(clippy::too_many_arguments)]
pub fn run_webhook_create(
    data_dir: String,
    name: String,
    url: String,
    events: String,
    project: Option<String>,
    app: Option<String>,
    headers: Vec<String>,
    disabled: bool,
) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;

    let event_types: Vec<String> = events
        .split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if event_types.is_empty() {
        anyhow::bail!("at least one event type is required");
    }

    if app.is_some() && project.is_none() {
        anyhow::bail!("--app requires --project");
    }

    let project_id = match &project {
        Some(project) => Some(store.create_or_get_project(project)?.id),
        None => None,
    };
    let app_id = match (&project_id, &app) {
        (Some(project_id), Some(app)) => Some(store.create_or_get_app(*project_id, app)?.id),
        _ => None,
    };

    let mut header_map = HashMap::new();
    for header in headers {
        let Some((key, value)) = header.split_once('=') else {
            anyhow::bail!("invalid header (expected key=value): {header}");
        };
        header_map.insert(key.trim().to_string(), value.trim().to_string());
    }
    let header_map = (!header_map.is_empty()).then_some(header_map);

    let webhook = store.create_webhook(
        &name,
        &event_types,
        &url,
        header_map.as_ref(),
        !disabled,
        project_id,
        app_id,
    )?;

    println!("Webhook {} created ({}).", webhook.id, webhook.name);
    Ok(())
}

pub fn run_webhook_list(data_dir: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    let webhooks = store.list_webhooks()?;

    if webhooks.is_empty() {
        println!("No webhooks.");
        return Ok(());
    }

    for webhook in webhooks {
        let state = if webhook.enabled { "enabled" } else { "disabled" };
        println!(
            "{}  {}  {}  [{}]  {}",
            webhook.id,
            webhook.name,
            webhook.url,
            webhook.event_types.join(","),
            state
        );
    }
    Ok(())
}

pub fn run_webhook_set_enabled(data_dir: String, id: i64, enabled: bool) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    if !store.set_webhook_enabled(id, enabled)? {
        anyhow::bail!("webhook not found: {id}");
    }
    println!(
        "Webhook {id} {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn run_webhook_delete(data_dir: String, id: i64) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    if !store.delete_webhook(id)? {
        anyhow::bail!("webhook not found: {id}");
    }
    println!("Webhook {id} deleted.");
    Ok(())
}
