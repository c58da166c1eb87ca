mod commands;
mod maintenance;
mod progress;
mod settings;
mod token;
mod transfer;
mod webhook;

pub use commands::{
    AdminCommands, ConfigCommands, PullArgs, PushArgs, ReleaseArgs, TokenCommands,
    WebhookCommands,
};
pub use maintenance::run_maintenance;
pub use progress::BarProgress;
pub use settings::{run_config_get, run_config_list, run_config_set};
pub use token::{run_token_create, run_token_list, run_token_revoke};
pub use transfer::{run_publish, run_pull, run_push, run_unpublish};
pub use webhook::{run_webhook_create, run_webhook_delete, run_webhook_list, run_webhook_set_enabled};

use std::path::PathBuf;
use std::sync::Arc;

use crate::store::{SqliteStore, Store};

/// Initialize store from data directory, checking it exists
pub fn init_store(data_dir: &str) -> anyhow::Result<Arc<SqliteStore>> {
    let data_path: PathBuf = data_dir.into();
    let db_path = data_path.join("stevedore.db");

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'stevedore admin init' first.",
            db_path.display()
        );
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    Ok(Arc::new(store))
}
