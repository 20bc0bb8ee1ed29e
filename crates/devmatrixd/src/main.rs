use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use devmatrix_ci::job::{LOGIN_VAR, TOKEN_VAR};
use devmatrix_ci::{CiClient, ClientConfig, Credentials, EngineExecutor, HttpJobQueue};
use devmatrix_core::{EnvOptions, Family};

/// CI worker: polls the coordination server for matrix cells and runs them.
#[derive(Parser, Debug)]
#[command(name = "devmatrixd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Coordination server base URL
    #[arg(long, env = "DEVMATRIX_CI_URL")]
    url: String,

    /// Worker login; falls back to DEVMATRIX_CI_LOGIN
    #[arg(long)]
    login: Option<String>,

    /// Worker token; falls back to DEVMATRIX_CI_TOKEN
    #[arg(long)]
    token: Option<String>,

    /// Seconds to sleep after an empty poll
    #[arg(long, env = "DEVMATRIX_CI_PERIOD", default_value_t = 60)]
    period: u64,

    /// Exit on the first empty poll
    #[arg(long)]
    once: bool,

    /// Only take jobs whose previous status is one of these
    #[arg(long, value_delimiter = ',')]
    status: Vec<String>,

    /// Exit after this many jobs
    #[arg(long)]
    max_jobs: Option<usize>,

    /// Directory holding the checkouts
    #[arg(long)]
    root: Option<PathBuf>,

    #[arg(long)]
    registry: Option<PathBuf>,

    #[arg(long, env = "DEVMATRIX_FAMILY", default_value = "datamapper")]
    family: String,

    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn credentials<F>(&self, lookup: F) -> devmatrix_ci::Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        Credentials::from_lookup(|key| {
            let flag = match key {
                LOGIN_VAR => self.login.clone(),
                TOKEN_VAR => self.token.clone(),
                _ => None,
            };
            flag.or_else(|| lookup(key))
        })
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll_period: Duration::from_secs(self.period),
            stop_when_done: self.once,
            statuses: self.status.clone(),
            max_jobs: self.max_jobs,
        }
    }

    fn base_options(&self) -> EnvOptions {
        EnvOptions {
            root: self.root.clone(),
            registry: self.registry.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    devmatrix_core::init_tracing(args.json, level);

    let family = Family::by_name(&args.family)?;
    let credentials = args
        .credentials(|key| std::env::var(key).ok())
        .context("Worker credentials are required")?;
    let queue =
        HttpJobQueue::new(&args.url, credentials).context("Failed to configure job queue")?;
    let executor = EngineExecutor::new(family, args.base_options());

    tracing::info!(url = %queue.base(), once = args.once, "devmatrixd started");
    let mut client = CiClient::new(Arc::new(queue), Arc::new(executor), args.client_config());
    let summary = client.run().await;
    tracing::info!(
        executed = summary.executed,
        rejected = summary.rejected,
        "devmatrixd stopped"
    );
    Ok(())
}
