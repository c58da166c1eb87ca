use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        /// Data directory for database and artifacts
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Manage API tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Manage outbound webhooks
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },

    /// Manage server configuration keys
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run the maintenance tasks once, outside the scheduled window
    Maintenance {
        /// Data directory for database and artifacts
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Server config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Create a new API token (the value is shown once)
    Create {
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Descriptive token name
        #[arg(long)]
        name: Option<String>,

        /// Restrict the token to one project
        #[arg(long)]
        project: Option<String>,

        /// Restrict the token to one app within --project
        #[arg(long)]
        app: Option<String>,

        /// Comma-separated permissions: pull,push,promote,admin
        #[arg(long, default_value = "pull,push")]
        permissions: String,

        /// Expire the token after this many days
        #[arg(long)]
        expires_days: Option<i64>,
    },

    /// List tokens
    List {
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Revoke a token by id
    Revoke {
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Token id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum WebhookCommands {
    /// Register a webhook
    Create {
        #[arg(long, default_value = "./data")]
        data_dir: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        url: String,

        /// Comma-separated event types, e.g. push,publish
        #[arg(long)]
        events: String,

        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,

        /// Restrict to one app within --project
        #[arg(long)]
        app: Option<String>,

        /// Extra request header, key=value (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Create disabled
        #[arg(long)]
        disabled: bool,
    },

    /// List webhooks
    List {
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Enable a webhook
    Enable {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        id: i64,
    },

    /// Disable a webhook
    Disable {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        id: i64,
    },

    /// Delete a webhook
    Delete {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print one config value
    Get {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        key: String,
    },

    /// Set a config value
    Set {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        key: String,
        value: String,
    },

    /// List all config values
    List {
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

/// Shared flags for push/pull.
#[derive(Args, Clone)]
pub struct TransferArgs {
    /// Project name (falls back to config)
    #[arg(long)]
    pub project: Option<String>,

    /// App name (falls back to config)
    #[arg(long)]
    pub app: Option<String>,

    /// Local directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Agent config file path (default: .stevedore.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server URL (overrides config file)
    #[arg(long)]
    pub server_url: Option<String>,

    /// Authentication token (overrides config file)
    #[arg(long)]
    pub token: Option<String>,

    /// Number of concurrent transfers (overrides config file)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Ignore pattern, repeatable or comma-separated (merges with config)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,
}

#[derive(Args)]
pub struct PushArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Version identifier to push as (required)
    #[arg(long)]
    pub version: String,
}

#[derive(Args)]
pub struct PullArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Version to pull; `latest` resolves the published version
    #[arg(long, default_value = "latest")]
    pub version: String,
}

/// Flags for publish/unpublish.
#[derive(Args)]
pub struct ReleaseArgs {
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub app: Option<String>,

    #[arg(long)]
    pub version: String,

    /// Agent config file path (default: .stevedore.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub server_url: Option<String>,

    #[arg(long)]
    pub token: Option<String>,
}
