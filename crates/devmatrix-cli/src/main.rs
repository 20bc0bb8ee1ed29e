//! devmatrix - build/test/release orchestration across a repository family
//!
//! The `devmatrix` command runs one operation over every selected
//! repository, repeating matrix operations over interpreter versions and
//! adapters.
//!
//! ## Commands
//!
//! - `sync`: clone missing checkouts, pull existing ones
//! - `spec`: run the test suite over the version x adapter matrix
//! - `bundle`: install/update/show/force dependency manifests per version
//! - `gem`: build and install or uninstall the package per version
//! - `release`, `implode`, `status`
//! - `registry`: list, add or import managed repositories

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use devmatrix_core::{EnvOptions, Environment, Family, OperationKind, Project, Registry, RunResults};

#[derive(Parser)]
#[command(name = "devmatrix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-repository build/test/release orchestration", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Project family supplying defaults (datamapper, generic)
    #[arg(long, global = true, env = "DEVMATRIX_FAMILY", default_value = "datamapper")]
    family: String,

    /// Directory holding the checkouts
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Dependency storage root (one directory per interpreter version)
    #[arg(long, global = true)]
    bundle_root: Option<PathBuf>,

    /// Repository registry file
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Only these repositories
    #[arg(long, global = true, value_delimiter = ',')]
    include: Option<Vec<String>>,

    /// Skip these repositories
    #[arg(long, global = true, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Interpreter versions
    #[arg(long, global = true, value_delimiter = ',')]
    rubies: Option<Vec<String>>,

    #[arg(long, global = true, value_delimiter = ',')]
    adapters: Option<Vec<String>>,

    /// Adapters usable on this machine
    #[arg(long, global = true, value_delimiter = ',')]
    available_adapters: Option<Vec<String>>,

    #[arg(long, global = true)]
    gemset: Option<String>,

    /// Dependency-source mode passed to family builds
    #[arg(long, global = true)]
    source: Option<String>,

    /// Target revision for sync and spec
    #[arg(long, global = true)]
    revision: Option<String>,

    /// Print literal command lines and stream subprocess output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log mutating steps without executing them
    #[arg(long, global = true)]
    pretend: bool,

    /// Print nothing
    #[arg(long, global = true)]
    silent: bool,

    /// Report elapsed time per unit
    #[arg(long, global = true)]
    benchmark: bool,

    /// Capture subprocess output into the results
    #[arg(long, global = true)]
    capture_output: bool,

    /// Clone with push-capable remotes
    #[arg(long, global = true)]
    development: bool,

    /// Print the result map as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,
}

impl GlobalArgs {
    /// Unset switches fall through to process variables.
    fn env_options(&self) -> EnvOptions {
        let switch = |on: bool| on.then_some(true);
        EnvOptions {
            root: self.root.clone(),
            bundle_root: self.bundle_root.clone(),
            registry: self.registry.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            rubies: self.rubies.clone(),
            adapters: self.adapters.clone(),
            available_adapters: self.available_adapters.clone(),
            gemset: self.gemset.clone(),
            source: self.source.clone(),
            revision: self.revision.clone(),
            verbose: switch(self.verbose),
            pretend: switch(self.pretend),
            silent: switch(self.silent),
            benchmark: switch(self.benchmark),
            capture_output: switch(self.capture_output),
            development: switch(self.development),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Clone missing repositories, pull existing ones
    Sync,

    /// Run specs over the interpreter-version x adapter matrix
    Spec,

    /// Clean and release each repository
    Release,

    /// Delete the checkouts
    Implode {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show the working tree status of each repository
    Status,

    /// Dependency-manifest operations
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },

    /// Package operations
    Gem {
        #[command(subcommand)]
        action: GemAction,
    },

    /// Manage the repository registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum BundleAction {
    Install,
    Update,
    Show,
    /// Remove per-version manifests and locks
    Force,
}

#[derive(Subcommand)]
enum GemAction {
    Install,
    Uninstall,
}

#[derive(Subcommand)]
enum RegistryAction {
    /// List registered repositories
    List,
    /// Register a repository by URL
    Add { url: String },
    /// Register every public repository of a GitHub user or organisation
    Import { user: String },
}

impl Commands {
    fn operation(&self) -> Option<OperationKind> {
        match self {
            Commands::Sync => Some(OperationKind::Sync),
            Commands::Spec => Some(OperationKind::Spec),
            Commands::Release => Some(OperationKind::Release),
            Commands::Implode { .. } => Some(OperationKind::Implode),
            Commands::Status => Some(OperationKind::Status),
            Commands::Bundle { action } => Some(match action {
                BundleAction::Install => OperationKind::BundleInstall,
                BundleAction::Update => OperationKind::BundleUpdate,
                BundleAction::Show => OperationKind::BundleShow,
                BundleAction::Force => OperationKind::BundleForce,
            }),
            Commands::Gem { action } => Some(match action {
                GemAction::Install => OperationKind::GemInstall,
                GemAction::Uninstall => OperationKind::GemUninstall,
            }),
            Commands::Registry { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    devmatrix_core::init_tracing(cli.global.log_json, level);

    let family = Family::by_name(&cli.global.family)?;
    let env = Environment::from_process(&family, &cli.global.env_options())
        .context("Failed to resolve environment")?;

    match cli.command {
        Commands::Registry { action } => cmd_registry(&env, action).await,
        Commands::Implode { yes } if !yes && !env.flags.pretend => {
            if confirm_implode(&env)? {
                cmd_run(env, family, OperationKind::Implode, cli.global.json).await
            } else {
                println!("Aborted");
                Ok(())
            }
        }
        ref command => {
            let operation = command
                .operation()
                .context("Command does not map to an operation")?;
            cmd_run(env, family, operation, cli.global.json).await
        }
    }
}

/// Run one operation over the selected repositories.
async fn cmd_run(env: Environment, family: Family, operation: OperationKind, json: bool) -> Result<()> {
    let silent = env.flags.silent;
    let mut project = Project::load(env, family).context("Failed to load repository registry")?;
    let results = project.run(operation).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if !silent {
        println!("{}", summary_line(&results));
    }

    let failed = results.tally().fail;
    if failed > 0 {
        anyhow::bail!("{operation}: {failed} unit(s) failed");
    }
    Ok(())
}

fn summary_line(results: &RunResults) -> String {
    let tally = results.tally();
    let mut line = format!(
        "{}: {} pass, {} fail, {} skip",
        results.operation, tally.pass, tally.fail, tally.skip
    );
    if let Some(ratio) = results.pass_ratio() {
        line.push_str(&format!(" ({:.0}% passing)", ratio * 100.0));
    }
    line
}

fn confirm_implode(env: &Environment) -> Result<bool> {
    let scope = match &env.included {
        Some(names) => names.join(", "),
        None => format!("every repository under {}", env.root.display()),
    };
    print!("This deletes {scope}. Are you really sure? [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(confirmed(&answer))
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn cmd_registry(env: &Environment, action: RegistryAction) -> Result<()> {
    match action {
        RegistryAction::List => {
            let registry = Registry::load(&env.registry_path).context("Failed to load repository registry")?;
            for entry in &registry.repositories {
                println!("{}\t{}", entry.name, entry.url);
            }
            Ok(())
        }
        RegistryAction::Add { url } => {
            let mut registry = Registry::load_or_default(&env.registry_path)?;
            if registry.add(&url) {
                registry.save().context("Failed to save repository registry")?;
                println!("Registered {url}");
            } else {
                println!("Already registered: {url}");
            }
            Ok(())
        }
        RegistryAction::Import { user } => {
            let mut registry = Registry::load_or_default(&env.registry_path)?;
            let client = reqwest::Client::new();
            let added = registry
                .import_github(&client, &user)
                .await
                .with_context(|| format!("Failed to import repositories of {user}"))?;
            registry.save().context("Failed to save repository registry")?;
            println!("Registered {added} new repositories from {user}");
            Ok(())
        }
    }
}
