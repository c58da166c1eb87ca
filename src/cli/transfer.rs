use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use crate::agent::{self, ApiClient};
use crate::config::{AgentConfig, AgentOverrides};

use super::commands::{PullArgs, PushArgs, ReleaseArgs, TransferArgs};
use super::progress::BarProgress;

/// Splits repeated/comma-separated `--ignore` values into patterns.
fn split_ignore(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn load_config(args: &TransferArgs) -> anyhow::Result<AgentConfig> {
    let overrides = AgentOverrides {
        server_url: args.server_url.clone(),
        token: args.token.clone(),
        project: args.project.clone(),
        app: args.app.clone(),
        ignore: split_ignore(&args.ignore),
        concurrency: args.concurrency,
    };
    Ok(AgentConfig::load(args.config.as_deref(), &overrides)?)
}

fn require_target(cfg: &AgentConfig) -> anyhow::Result<(String, String)> {
    let project = cfg
        .project
        .clone()
        .context("project is required (--project or config file)")?;
    let app = cfg
        .app
        .clone()
        .context("app is required (--app or config file)")?;
    Ok((project, app))
}

pub async fn run_push(args: PushArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let cfg = load_config(&args.transfer)?;
    let (project, app) = require_target(&cfg)?;

    println!(
        "Pushing {}/{}:{} from {}",
        project,
        app,
        args.version,
        args.transfer.path.display()
    );

    let client = ApiClient::new(&cfg.server_url, &cfg.token)?;
    let progress = Arc::new(BarProgress::new());

    let outcome = agent::push(
        &client,
        &project,
        &app,
        &args.version,
        &args.transfer.path,
        &cfg.ignore,
        cfg.concurrency,
        progress,
    )
    .await?;

    println!(
        "Pushed {} files ({} bytes) as {}/{}:{} in {:.1?}",
        outcome.manifest.files.len(),
        outcome.manifest.total_size(),
        project,
        app,
        args.version,
        started.elapsed()
    );
    Ok(())
}

pub async fn run_pull(args: PullArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let cfg = load_config(&args.transfer)?;
    let (project, app) = require_target(&cfg)?;

    println!(
        "Pulling {}/{}:{} into {}",
        project,
        app,
        args.version,
        args.transfer.path.display()
    );

    let client = ApiClient::new(&cfg.server_url, &cfg.token)?;
    let progress = Arc::new(BarProgress::new());

    let outcome = agent::pull(
        &client,
        &project,
        &app,
        &args.version,
        &args.transfer.path,
        cfg.concurrency,
        progress,
    )
    .await?;

    println!(
        "Pulled {} files ({} bytes) of {}/{}:{} in {:.1?}",
        outcome.file_count,
        outcome.total_size,
        project,
        app,
        outcome.version,
        started.elapsed()
    );
    Ok(())
}

fn release_config(args: &ReleaseArgs) -> anyhow::Result<(AgentConfig, String, String)> {
    let overrides = AgentOverrides {
        server_url: args.server_url.clone(),
        token: args.token.clone(),
        project: args.project.clone(),
        app: args.app.clone(),
        ..Default::default()
    };
    let cfg = AgentConfig::load(args.config.as_deref(), &overrides)?;
    let (project, app) = require_target(&cfg)?;
    Ok((cfg, project, app))
}

pub async fn run_publish(args: ReleaseArgs) -> anyhow::Result<()> {
    let (cfg, project, app) = release_config(&args)?;
    let client = ApiClient::new(&cfg.server_url, &cfg.token)?;
    client.publish(&project, &app, &args.version).await?;
    println!("Published {}/{}:{}", project, app, args.version);
    Ok(())
}

pub async fn run_unpublish(args: ReleaseArgs) -> anyhow::Result<()> {
    let (cfg, project, app) = release_config(&args)?;
    let client = ApiClient::new(&cfg.server_url, &cfg.token)?;
    client.unpublish(&project, &app, &args.version).await?;
    println!("Unpublished {}/{}:{}", project, app, args.version);
    Ok(())
}
