//! `cla-sync`: applies one batch of store change events to the code hosts.
//!
//! 1. **Configuration.** TOML file (`--config` / `CLA_SYNC_CONFIG`), secrets
//!    from the environment, then command-line overrides.
//! 2. **Observability.** `tracing-subscriber` with a JSON or pretty layer and
//!    an optional OTLP exporter.
//! 3. **Composition.** The in-memory store seeded from a snapshot, the GitHub
//!    and GitLab adapters behind rate-limit decorators, and the event router.
//! 4. **Dispatch.** The batch is read from a file or stdin and dispatched under
//!    one invocation deadline.
//!
//! Exits non-zero when a record was rejected or a handler failed.

mod app;
mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use listener::BatchSource;
use store::{MemoryStore, Snapshot};
use tracing::{error, info, warn};

use crate::app::App;
use crate::config::Config;
use crate::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "cla-sync", version, about = "Reconcile code-host settings with CLA store changes")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "CLA_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Deployment stage; overrides `stage` in the configuration file.
    #[arg(long, env = "STAGE")]
    stage: Option<String>,

    /// Change batch to process. `-` or omitted reads standard input.
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Store snapshot; overrides `snapshot` in the configuration file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env(|name| std::env::var(name).ok());
        if let Some(stage) = &self.stage {
            config.stage = stage.clone();
        }
        if let Some(snapshot) = &self.snapshot {
            config.snapshot = Some(snapshot.clone());
        }
        if let Some(format) = self.log_format {
            config.telemetry.format = format;
        }
        Ok(config)
    }
}

async fn load_store(config: &Config) -> anyhow::Result<Arc<MemoryStore>> {
    match &config.snapshot {
        Some(path) => {
            let snapshot = Snapshot::load(path).await?;
            Ok(Arc::new(MemoryStore::from_snapshot(snapshot)))
        }
        None => {
            warn!("no store snapshot configured; starting with an empty store");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let store = load_store(&config).await?;
    let persist_to = config.snapshot.clone().filter(|_| config.persist_snapshot);

    let batch = BatchSource::from_arg(cli.batch)
        .load()
        .await
        .context("loading change batch")?;
    let app = App::build(config, Arc::clone(&store))?;
    let report = app.process(&batch).await;

    if let Some(path) = persist_to {
        store.snapshot().await.save(&path).await?;
        info!(path = %path.display(), "store snapshot written");
    }

    if report.is_clean() && batch.rejected.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config()?;
    let _telemetry = telemetry::init(&config.telemetry)?;

    info!(stage = %config.stage, version = env!("CARGO_PKG_VERSION"), "cla-sync starting");
    match run(cli, config).await {
        Ok(code) => Ok(code),
        Err(err) => {
            let chain = format!("{err:#}");
            error!(error = %chain, "cla-sync failed");
            Err(err)
        }
    }
}
