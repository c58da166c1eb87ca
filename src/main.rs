use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stevedore::auth::TokenGenerator;
use stevedore::cli::{self, AdminCommands, ConfigCommands, TokenCommands, WebhookCommands};
use stevedore::config::{ServerConfig, ServerConfigOverrides};
use stevedore::scheduler::{
    AuditTrimTask, CONFIG_AUDIT_RETENTION_DAYS, CONFIG_VERSION_RETENTION,
    DEFAULT_AUDIT_RETENTION_DAYS, DEFAULT_VERSION_RETENTION, IncompleteGcTask, RetentionTask,
    Scheduler,
};
use stevedore::server::{AppState, create_router};
use stevedore::storage::{ArtifactManager, create_store};
use stevedore::store::{SqliteStore, Store};
use stevedore::types::{Permissions, Token};

fn create_token(
    generator: &TokenGenerator,
    permissions: Permissions,
    name: Option<String>,
) -> anyhow::Result<(Token, String)> {
    let (raw_token, lookup, hash) = generator.generate()?;
    let token = Token {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        name,
        project_id: None,
        app_id: None,
        permissions,
        created_at: Utc::now(),
        expires_at: None,
        last_used_at: None,
    };
    Ok((token, raw_token))
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(about = "Artifact distribution server and agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for database and artifacts
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Server config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Push artifacts from a local directory
    Push(cli::PushArgs),

    /// Pull artifacts into a local directory
    Pull(cli::PullArgs),

    /// Mark a version as the published one
    Publish(cli::ReleaseArgs),

    /// Clear the published flag of a version
    Unpublish(cli::ReleaseArgs),
}

fn run_init(data_dir: String, non_interactive: bool) -> anyhow::Result<()> {
    let data_path: PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let db_path = data_path.join("stevedore.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let token_file = data_path.join(".admin_token");

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    if store.get_config(CONFIG_VERSION_RETENTION)?.is_none() {
        store.set_config(CONFIG_VERSION_RETENTION, DEFAULT_VERSION_RETENTION)?;
    }
    if store.get_config(CONFIG_AUDIT_RETENTION_DAYS)?.is_none() {
        store.set_config(CONFIG_AUDIT_RETENTION_DAYS, DEFAULT_AUDIT_RETENTION_DAYS)?;
    }

    let generator = TokenGenerator::new();
    let (token, raw_token) =
        create_token(&generator, Permissions::ADMIN, Some("admin".to_string()))?;

    store.create_token(&token)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_agent_token_prompt(&store, &generator)?;
    }

    Ok(())
}

fn create_agent_token_prompt(store: &SqliteStore, generator: &TokenGenerator) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Create an agent token (pull/push/promote)?")
        .with_default(false)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let permissions = Permissions::PULL
        .union(Permissions::PUSH)
        .union(Permissions::PROMOTE);
    let (token, raw_token) = create_token(generator, permissions, Some("agent".to_string()))?;
    store.create_token(&token)?;

    println!();
    println!("========================================");
    println!("Agent token:");
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = ServerConfig::load_with_overrides(
        config_path.as_deref(),
        ServerConfigOverrides {
            host,
            port,
            data_dir,
        },
    )?;

    let token_file = config.data_dir.join(".admin_token");
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'stevedore admin init' first to create the database and admin token."
        );
    }

    let store = Arc::new(SqliteStore::new(config.db_path())?);
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'stevedore admin init' first to create the database and admin token."
        );
    }

    info!("Admin token available at {}", token_file.display());

    let blobs = create_store(&config.storage_config()).await?;
    let artifacts = ArtifactManager::new(blobs.clone());

    let state = Arc::new(AppState::new(
        store.clone(),
        blobs,
        config.strict_token_scope,
        config.public_listing,
    ));

    let mut scheduler = Scheduler::new(
        config.maintenance_hour,
        config.maintenance_window_minutes,
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
    tokio::spawn(scheduler.run());

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stevedore=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                run_init(data_dir, non_interactive)?;
            }
            AdminCommands::Token { command } => match command {
                TokenCommands::Create {
                    data_dir,
                    name,
                    project,
                    app,
                    permissions,
                    expires_days,
                } => {
                    cli::run_token_create(data_dir, name, project, app, permissions, expires_days)
                        .await?;
                }
                TokenCommands::List { data_dir } => cli::run_token_list(data_dir)?,
                TokenCommands::Revoke { data_dir, id } => {
                    cli::run_token_revoke(data_dir, id).await?;
                }
            },
            AdminCommands::Webhook { command } => match command {
                WebhookCommands::Create {
                    data_dir,
                    name,
                    url,
                    events,
                    project,
                    app,
                    headers,
                    disabled,
                } => {
                    cli::run_webhook_create(
                        data_dir, name, url, events, project, app, headers, disabled,
                    )?;
                }
                WebhookCommands::List { data_dir } => cli::run_webhook_list(data_dir)?,
                WebhookCommands::Enable { data_dir, id } => {
                    cli::run_webhook_set_enabled(data_dir, id, true)?;
                }
                WebhookCommands::Disable { data_dir, id } => {
                    cli::run_webhook_set_enabled(data_dir, id, false)?;
                }
                WebhookCommands::Delete { data_dir, id } => {
                    cli::run_webhook_delete(data_dir, id)?;
                }
            },
            AdminCommands::Config { command } => match command {
                ConfigCommands::Get { data_dir, key } => cli::run_config_get(data_dir, key)?,
                ConfigCommands::Set {
                    data_dir,
                    key,
                    value,
                } => cli::run_config_set(data_dir, key, value)?,
                ConfigCommands::List { data_dir } => cli::run_config_list(data_dir)?,
            },
            AdminCommands::Maintenance { data_dir, config } => {
                cli::run_maintenance(data_dir, config).await?;
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            run_serve(host, port, data_dir, config).await?;
        }
        Commands::Push(args) => cli::run_push(args).await?,
        Commands::Pull(args) => cli::run_pull(args).await?,
        Commands::Publish(args) => cli::run_publish(args).await?,
        Commands::Unpublish(args) => cli::run_unpublish(args).await?,
    }

    Ok(())
}
