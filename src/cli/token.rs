use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::TokenGenerator;
use crate::events::{EventPublisher, EventType};
use crate::store::Store;
use crate::types::{Permissions, Token};

use super::init_store;

#[allow(clippy::too_many_arguments)]
pub async fn run_token_create(
    data_dir: String,
    name: Option<String>,
    project: Option<String>,
    app: Option<String>,
    permissions: String,
    expires_days: Option<i64>,
) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;

    let permissions = Permissions::parse_list(&permissions)
        .ok_or_else(|| anyhow::anyhow!("invalid permissions: expected pull,push,promote,admin"))?;
    if permissions.is_empty() {
        anyhow::bail!("at least one permission is required");
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

    let generator = TokenGenerator::new();
    let (raw_token, lookup, hash) = generator.generate()?;

    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        name: name.clone(),
        project_id,
        app_id,
        permissions,
        created_at: Utc::now(),
        expires_at: expires_days.map(|days| Utc::now() + Duration::days(days)),
        last_used_at: None,
    };
    store.create_token(&token)?;

    let events = Arc::new(EventPublisher::new(store.clone() as Arc<dyn Store>));
    events.publish(
        EventType::TokenCreate,
        project.as_deref().unwrap_or(""),
        app.as_deref().unwrap_or(""),
        None,
        None,
        serde_json::json!({
            "token_id": token.id,
            "name": token.name,
            "permissions": token.permissions.to_string(),
        }),
    );

    println!();
    println!("========================================");
    println!("Token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("  id:          {}", token.id);
    println!("  permissions: {}", token.permissions);
    if let Some(name) = &token.name {
        println!("  name:        {name}");
    }
    if let Some(expires_at) = &token.expires_at {
        println!("  expires:     {}", expires_at.to_rfc3339());
    }
    println!("========================================");
    println!();

    Ok(())
}

pub fn run_token_list(data_dir: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    let tokens = store.list_tokens()?;

    if tokens.is_empty() {
        println!("No tokens.");
        return Ok(());
    }

    for token in tokens {
        let name = token.name.as_deref().unwrap_or("-");
        let expires = token
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {}  [{}]  expires: {}",
            token.id, name, token.permissions, expires
        );
    }
    Ok(())
}

pub async fn run_token_revoke(data_dir: String, id: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;

    if !store.delete_token(&id)? {
        anyhow::bail!("token not found: {id}");
    }

    let events = Arc::new(EventPublisher::new(store.clone() as Arc<dyn Store>));
    events.publish(
        EventType::TokenDelete,
        "",
        "",
        None,
        None,
        serde_json::json!({ "token_id": id }),
    );

    println!("Token {id} revoked.");
    Ok(())
}
