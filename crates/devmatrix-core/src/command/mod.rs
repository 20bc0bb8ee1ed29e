//! Command engine.
//!
//! A [`Command`] is one operation bound to one repository. It is a single
//! executor assembled from strategy objects: a command-line builder, an
//! optional subprocess environment builder, an executable gate, a skip
//! policy and preparation steps. Operation names map to constructors through
//! a [`DispatchTable`] that callers may override per operation.

pub mod bundle;
pub mod gem;
pub mod maintenance;
pub mod spec;
pub mod sync;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{MatrixError, Result};
use crate::family::Family;
use crate::logger::Logger;
use crate::matrix::{applicable_adapters, Grid};
use crate::probe::WorkspaceProbe;
use crate::repository::Repository;
use crate::result::{Cell, CellResult, CommandResult, SkipReason, Status};
use crate::shell::{Invocation, OutputMode, Shell};

/// Closed set of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "sync")]
    Sync,
    #[serde(rename = "bundle:install")]
    BundleInstall,
    #[serde(rename = "bundle:update")]
    BundleUpdate,
    #[serde(rename = "bundle:show")]
    BundleShow,
    #[serde(rename = "bundle:force")]
    BundleForce,
    #[serde(rename = "spec")]
    Spec,
    #[serde(rename = "release")]
    Release,
    #[serde(rename = "implode")]
    Implode,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "gem:install")]
    GemInstall,
    #[serde(rename = "gem:uninstall")]
    GemUninstall,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::Sync,
        OperationKind::BundleInstall,
        OperationKind::BundleUpdate,
        OperationKind::BundleShow,
        OperationKind::BundleForce,
        OperationKind::Spec,
        OperationKind::Release,
        OperationKind::Implode,
        OperationKind::Status,
        OperationKind::GemInstall,
        OperationKind::GemUninstall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Sync => "sync",
            OperationKind::BundleInstall => "bundle:install",
            OperationKind::BundleUpdate => "bundle:update",
            OperationKind::BundleShow => "bundle:show",
            OperationKind::BundleForce => "bundle:force",
            OperationKind::Spec => "spec",
            OperationKind::Release => "release",
            OperationKind::Implode => "implode",
            OperationKind::Status => "status",
            OperationKind::GemInstall => "gem:install",
            OperationKind::GemUninstall => "gem:uninstall",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| MatrixError::UnknownOperation(s.to_string()))
    }
}

/// Which configuration axes a command repeats over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axes {
    /// One unit per repository.
    Single,
    /// One unit per interpreter version.
    Rubies,
    /// Interpreter version x applicable adapter.
    Matrix,
}

/// Everything a strategy may look at while building one unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub repo: &'a Repository,
    pub env: &'a Environment,
    pub family: &'a Family,
    pub cell: &'a Cell,
}

impl<'a> UnitContext<'a> {
    /// Interpreter version of the unit. Empty for single-unit commands.
    pub fn ruby(&self) -> &'a str {
        self.cell.ruby.as_deref().unwrap_or_default()
    }

    pub fn adapter(&self) -> &'a str {
        self.cell.adapter.as_deref().unwrap_or_default()
    }
}

/// Shared collaborators of one run.
pub struct RunContext<'a> {
    pub env: &'a Environment,
    pub family: &'a Family,
    pub shell: &'a dyn Shell,
    pub probe: &'a dyn WorkspaceProbe,
    pub logger: &'a mut Logger,
}

/// Builds the literal shell command line of a unit.
pub trait CommandLineBuilder: Send + Sync {
    fn build(&self, unit: &UnitContext<'_>, vars: &[(String, String)]) -> Result<String>;
}

/// Subprocess variables embedded into the command line.
pub trait EnvironmentBuilder: Send + Sync {
    fn variables(&self, unit: &UnitContext<'_>) -> Vec<(String, String)>;
}

/// Decides whether the repository can run the command at all.
pub trait ExecutableGate: Send + Sync {
    /// `None` when executable, else the explanation for skipping.
    fn check(&self, repo: &Repository, family: &Family, probe: &dyn WorkspaceProbe) -> Option<SkipReason>;
}

/// Policy skips, evaluated per interpreter row and per cell.
pub trait SkipPolicy: Send + Sync {
    fn skip_row(
        &self,
        _repo: &Repository,
        _env: &Environment,
        _probe: &dyn WorkspaceProbe,
        _ruby: &str,
    ) -> Option<SkipReason> {
        None
    }

    fn skip_cell(&self, _unit: &UnitContext<'_>, _probe: &dyn WorkspaceProbe) -> Option<SkipReason> {
        None
    }
}

/// Side-effecting step run before units execute.
#[async_trait]
pub trait Preparation: Send + Sync {
    /// `ruby` is `None` for steps that run once per repository.
    async fn prepare(&self, ctx: &mut RunContext<'_>, command: &Command, ruby: Option<&str>) -> Result<()>;
}

/// How units report progress while they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitLog {
    /// One progress line per unit.
    Lines,
    /// A grid row per interpreter version instead of unit lines.
    Grid,
    Quiet,
}

impl UnitLog {
    fn lines(self) -> bool {
        self == UnitLog::Lines
    }
}

/// One operation bound to one repository.
pub struct Command {
    pub kind: OperationKind,
    pub repo: Repository,
    pub action: String,
    pub working_dir: PathBuf,
    axes: Axes,
    line: Box<dyn CommandLineBuilder>,
    environment: Option<Box<dyn EnvironmentBuilder>>,
    gate: Option<Box<dyn ExecutableGate>>,
    skip: Option<Box<dyn SkipPolicy>>,
    once: Vec<Box<dyn Preparation>>,
    per_ruby: Vec<Box<dyn Preparation>>,
    throttle: Duration,
    output: Option<OutputMode>,
    read_only: bool,
}

impl Command {
    pub fn new(
        kind: OperationKind,
        repo: &Repository,
        action: impl Into<String>,
        working_dir: PathBuf,
        line: impl CommandLineBuilder + 'static,
    ) -> Self {
        Self {
            kind,
            repo: repo.clone(),
            action: action.into(),
            working_dir,
            axes: Axes::Single,
            line: Box::new(line),
            environment: None,
            gate: None,
            skip: None,
            once: Vec::new(),
            per_ruby: Vec::new(),
            throttle: Duration::ZERO,
            output: None,
            read_only: false,
        }
    }

    pub fn with_axes(mut self, axes: Axes) -> Self {
        self.axes = axes;
        self
    }

    pub fn with_environment(mut self, builder: impl EnvironmentBuilder + 'static) -> Self {
        self.environment = Some(Box::new(builder));
        self
    }

    pub fn with_gate(mut self, gate: impl ExecutableGate + 'static) -> Self {
        self.gate = Some(Box::new(gate));
        self
    }

    pub fn with_skip_policy(mut self, policy: impl SkipPolicy + 'static) -> Self {
        self.skip = Some(Box::new(policy));
        self
    }

    /// Step run once per repository, before any unit.
    pub fn prepare_once(mut self, step: impl Preparation + 'static) -> Self {
        self.once.push(Box::new(step));
        self
    }

    /// Step run at the start of every interpreter row.
    pub fn prepare_per_ruby(mut self, step: impl Preparation + 'static) -> Self {
        self.per_ruby.push(Box::new(step));
        self
    }

    pub fn with_throttle(mut self, delay: Duration) -> Self {
        self.throttle = delay;
        self
    }

    /// Force an output mode regardless of flags.
    pub fn with_output(mut self, mode: OutputMode) -> Self {
        self.output = Some(mode);
        self
    }

    /// Read-only commands still execute in dry-run mode.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn axes(&self) -> Axes {
        self.axes
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Literal command line of one unit, as it would be executed.
    pub fn command_line(&self, env: &Environment, family: &Family, cell: &Cell) -> Result<String> {
        let unit = UnitContext {
            repo: &self.repo,
            env,
            family,
            cell,
        };
        let vars = self.variables(&unit);
        self.line.build(&unit, &vars)
    }

    /// Run over every configured interpreter version.
    pub async fn run(&self, ctx: &mut RunContext<'_>) -> Vec<CellResult> {
        let env = ctx.env;
        self.run_rubies(ctx, &env.rubies).await
    }

    /// Run over the given interpreter versions. Results follow nested order:
    /// version outer, adapter inner.
    pub async fn run_rubies(&self, ctx: &mut RunContext<'_>, rubies: &[String]) -> Vec<CellResult> {
        let grid = self.grid(ctx, rubies);
        let log = if grid.is_some() { UnitLog::Grid } else { UnitLog::Lines };
        self.run_units(ctx, rubies, grid, log).await
    }

    /// Run as a step of another command: no progress lines, no grid.
    pub async fn run_quiet(&self, ctx: &mut RunContext<'_>, rubies: &[String]) -> Vec<CellResult> {
        self.run_units(ctx, rubies, None, UnitLog::Quiet).await
    }

    async fn run_units(
        &self,
        ctx: &mut RunContext<'_>,
        rubies: &[String],
        grid: Option<Grid>,
        log: UnitLog,
    ) -> Vec<CellResult> {
        let env = ctx.env;
        let family = ctx.family;
        let rows = self.rows(env, rubies);

        if let Some(gate) = &self.gate {
            if let Some(reason) = gate.check(&self.repo, family, ctx.probe) {
                tracing::warn!(repo = %self.repo.name, ?reason, operation = self.kind.name(), "not executable");
                return self.skip_all(ctx, &rows, reason, log);
            }
        }

        for step in &self.once {
            if let Err(e) = step.prepare(ctx, self, None).await {
                tracing::warn!(repo = %self.repo.name, error = %e, "preparation failed");
                return fail_all(&rows, &e.to_string());
            }
        }

        if let Some(grid) = &grid {
            for line in grid.header(&self.repo.name) {
                ctx.logger.line(&line);
            }
        }

        let mut results = Vec::new();
        for (ruby, cells) in &rows {
            let row = self.run_row(ctx, ruby.as_deref(), cells, log).await;
            if let (Some(grid), Some(ruby)) = (&grid, ruby) {
                let statuses: Vec<Status> = row.iter().map(|c| c.result.status).collect();
                ctx.logger.line(&grid.row(ruby, &statuses));
            }
            results.extend(row);
        }
        results
    }

    async fn run_row(
        &self,
        ctx: &mut RunContext<'_>,
        ruby: Option<&str>,
        cells: &[Cell],
        log: UnitLog,
    ) -> Vec<CellResult> {
        let env = ctx.env;
        let family = ctx.family;

        if let (Some(policy), Some(ruby)) = (&self.skip, ruby) {
            if let Some(reason) = policy.skip_row(&self.repo, env, ctx.probe, ruby) {
                tracing::warn!(repo = %self.repo.name, ruby, ?reason, "skipping interpreter row");
                return self.skip_cells(ctx, cells, reason, log);
            }
        }

        if ruby.is_some() {
            for step in &self.per_ruby {
                if let Err(e) = step.prepare(ctx, self, ruby).await {
                    tracing::warn!(repo = %self.repo.name, error = %e, "preparation failed");
                    return fail_all(&[(ruby.map(str::to_string), cells.to_vec())], &e.to_string());
                }
            }
        }

        let mut results = Vec::with_capacity(cells.len());
        for cell in cells {
            let unit = UnitContext {
                repo: &self.repo,
                env,
                family,
                cell,
            };
            let skipped = self
                .skip
                .as_ref()
                .and_then(|policy| policy.skip_cell(&unit, ctx.probe));
            let result = match skipped {
                Some(reason) => {
                    if log.lines() {
                        self.log_skip(ctx, cell, reason);
                    }
                    CommandResult::skip(reason)
                }
                None => self.execute(ctx, &unit, log).await,
            };
            results.push(CellResult {
                cell: cell.clone(),
                result,
            });
        }
        results
    }

    async fn execute(&self, ctx: &mut RunContext<'_>, unit: &UnitContext<'_>, log: UnitLog) -> CommandResult {
        let vars = self.variables(unit);
        let line = match self.line.build(unit, &vars) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(repo = %self.repo.name, error = %e, "could not build command line");
                return CommandResult::error(e.to_string());
            }
        };

        if log.lines() {
            ctx.logger.log(&self.repo.name, &self.action_for(unit.cell), None, Some(&line));
        }

        if ctx.env.flags.pretend && !self.read_only {
            return CommandResult::pass();
        }

        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }

        let invocation = Invocation {
            working_dir: self.working_dir.clone(),
            command_line: line,
            output: self
                .output
                .unwrap_or_else(|| OutputMode::from_flags(&ctx.env.flags)),
        };
        tracing::info!(
            repo = %self.repo.name,
            operation = self.kind.name(),
            ruby = unit.ruby(),
            adapter = unit.adapter(),
            "executing"
        );

        match ctx.shell.execute(&invocation).await {
            Ok(outcome) => {
                if log != UnitLog::Quiet {
                    ctx.logger.log_duration(&self.repo.name, outcome.duration);
                }
                CommandResult {
                    status: if outcome.success { Status::Pass } else { Status::Fail },
                    output: outcome.output,
                    duration_ms: Some(outcome.duration.as_millis() as u64),
                    reason: None,
                }
            }
            Err(e) => {
                tracing::warn!(repo = %self.repo.name, error = %e, "subprocess failed to start");
                CommandResult::error(e.to_string())
            }
        }
    }

    fn variables(&self, unit: &UnitContext<'_>) -> Vec<(String, String)> {
        self.environment
            .as_ref()
            .map(|builder| builder.variables(unit))
            .unwrap_or_default()
    }

    fn rows(&self, env: &Environment, rubies: &[String]) -> Vec<(Option<String>, Vec<Cell>)> {
        match self.axes {
            Axes::Single => vec![(None, vec![Cell::single()])],
            Axes::Rubies => rubies
                .iter()
                .map(|ruby| (Some(ruby.clone()), vec![Cell::ruby(ruby)]))
                .collect(),
            Axes::Matrix => {
                let adapters = applicable_adapters(&env.adapters, &self.repo.name);
                rubies
                    .iter()
                    .map(|ruby| {
                        let cells = adapters.iter().map(|a| Cell::matrix(ruby, a)).collect();
                        (Some(ruby.clone()), cells)
                    })
                    .collect()
            }
        }
    }

    /// Matrix commands render a grid unless literal command lines are shown.
    fn grid(&self, ctx: &RunContext<'_>, rubies: &[String]) -> Option<Grid> {
        if self.axes != Axes::Matrix || ctx.logger.shows_commands() {
            return None;
        }
        let adapters = applicable_adapters(&ctx.env.adapters, &self.repo.name);
        Some(Grid::new(rubies, &adapters))
    }

    fn skip_all(
        &self,
        ctx: &mut RunContext<'_>,
        rows: &[(Option<String>, Vec<Cell>)],
        reason: SkipReason,
        log: UnitLog,
    ) -> Vec<CellResult> {
        let mut results = Vec::new();
        for (_, cells) in rows {
            results.extend(self.skip_cells(ctx, cells, reason, log));
        }
        results
    }

    fn skip_cells(
        &self,
        ctx: &mut RunContext<'_>,
        cells: &[Cell],
        reason: SkipReason,
        log: UnitLog,
    ) -> Vec<CellResult> {
        let mut results = Vec::with_capacity(cells.len());
        for cell in cells {
            if log.lines() {
                self.log_skip(ctx, cell, reason);
            }
            results.push(CellResult {
                cell: cell.clone(),
                result: CommandResult::skip(reason),
            });
        }
        results
    }

    fn log_skip(&self, ctx: &mut RunContext<'_>, cell: &Cell, reason: SkipReason) {
        let line = self.command_line(ctx.env, ctx.family, cell).ok();
        let message = format!("SKIPPED - {}", reason.explanation());
        ctx.logger
            .log(&self.repo.name, &self.action_for(cell), Some(&message), line.as_deref());
    }

    /// `[1.9.2] bundle install`, `[1.9.2 sqlite] spec`, or the bare action.
    fn action_for(&self, cell: &Cell) -> String {
        match (&cell.ruby, &cell.adapter) {
            (Some(ruby), Some(adapter)) => format!("[{ruby} {adapter}] {}", self.action),
            (Some(ruby), None) => format!("[{ruby}] {}", self.action),
            _ => self.action.clone(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("repo", &self.repo.name)
            .field("action", &self.action)
            .field("working_dir", &self.working_dir)
            .field("axes", &self.axes)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

fn fail_all(rows: &[(Option<String>, Vec<Cell>)], detail: &str) -> Vec<CellResult> {
    rows.iter()
        .flat_map(|(_, cells)| cells)
        .map(|cell| CellResult {
            cell: cell.clone(),
            result: CommandResult::error(detail),
        })
        .collect()
}

/// Constructor of one operation's command.
pub type Constructor = fn(&Repository, &Environment, &Family, &dyn WorkspaceProbe) -> Command;

/// Operation name -> command constructor, built once at startup.
#[derive(Clone)]
pub struct DispatchTable {
    entries: BTreeMap<OperationKind, Constructor>,
}

impl DispatchTable {
    /// Table with the built-in constructor of every operation.
    pub fn standard() -> Self {
        let mut entries: BTreeMap<OperationKind, Constructor> = BTreeMap::new();
        entries.insert(OperationKind::Sync, sync::build);
        entries.insert(OperationKind::BundleInstall, bundle::install);
        entries.insert(OperationKind::BundleUpdate, bundle::update);
        entries.insert(OperationKind::BundleShow, bundle::show);
        entries.insert(OperationKind::BundleForce, bundle::force);
        entries.insert(OperationKind::Spec, spec::build);
        entries.insert(OperationKind::Release, maintenance::release);
        entries.insert(OperationKind::Implode, maintenance::implode);
        entries.insert(OperationKind::Status, maintenance::status);
        entries.insert(OperationKind::GemInstall, gem::install);
        entries.insert(OperationKind::GemUninstall, gem::uninstall);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Replace the constructor of one operation, returning the previous one.
    pub fn register(&mut self, kind: OperationKind, constructor: Constructor) -> Option<Constructor> {
        self.entries.insert(kind, constructor)
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn construct(
        &self,
        kind: OperationKind,
        repo: &Repository,
        env: &Environment,
        family: &Family,
        probe: &dyn WorkspaceProbe,
    ) -> Result<Command> {
        let constructor = self
            .entries
            .get(&kind)
            .ok_or_else(|| MatrixError::UnknownOperation(kind.name().to_string()))?;
        Ok(constructor(repo, env, family, probe))
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.keys().map(|k| k.name()))
            .finish()
    }
}
