//! Entry point: one operation over every selected repository.

use std::path::Path;
use std::sync::Arc;

use crate::command::{DispatchTable, OperationKind, RunContext};
use crate::environment::Environment;
use crate::error::Result;
use crate::family::Family;
use crate::hooks::{run_hooks, LifecycleHook, Phase};
use crate::logger::Logger;
use crate::probe::{GitProbe, WorkspaceProbe};
use crate::registry::Registry;
use crate::repository::{Repository, RepositorySet};
use crate::result::{Cell, CellResult, CommandResult, RunResults};
use crate::shell::{Shell, SystemShell};

pub struct Project {
    env: Environment,
    family: Family,
    repositories: Vec<Repository>,
    table: DispatchTable,
    shell: Arc<dyn Shell>,
    probe: Arc<dyn WorkspaceProbe>,
    hooks: Vec<LifecycleHook>,
    logger: Logger,
}

impl Project {
    /// Project over an explicit repository list, with the system shell, the
    /// git probe, the family's default hooks and a stdout logger.
    pub fn new(env: Environment, family: Family, repositories: Vec<Repository>) -> Self {
        let hooks = family.default_hooks();
        let logger = Logger::stdout(&env.flags);
        Self {
            env,
            family,
            repositories,
            table: DispatchTable::standard(),
            shell: Arc::new(SystemShell),
            probe: Arc::new(GitProbe),
            hooks,
            logger,
        }
    }

    /// Load the registry and select repositories relative to the process
    /// working directory. An unreadable registry aborts before any work.
    pub fn load(env: Environment, family: Family) -> Result<Self> {
        let registry = Registry::load(&env.registry_path)?;
        let cwd = std::env::current_dir()?;
        Ok(Self::from_registry(env, family, &registry, &cwd))
    }

    pub fn from_registry(env: Environment, family: Family, registry: &Registry, cwd: &Path) -> Self {
        let repositories = RepositorySet::resolve(registry, &env, &family, cwd);
        Self::new(env, family, repositories)
    }

    pub fn with_shell(mut self, shell: Arc<dyn Shell>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn WorkspaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the hook list, including the family defaults.
    pub fn with_hooks(mut self, hooks: Vec<LifecycleHook>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn add_hook(mut self, hook: LifecycleHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_dispatch(mut self, table: DispatchTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Run one operation. Repositories are processed one at a time in
    /// selection order; a failing repository never stops the loop.
    pub async fn run(&mut self, operation: OperationKind) -> RunResults {
        let mut results = RunResults::new(operation.name());
        let Self {
            env,
            family,
            repositories,
            table,
            shell,
            probe,
            hooks,
            logger,
        } = self;
        let env: &Environment = env;
        let family: &Family = family;

        tracing::info!(
            run_id = %results.run_id,
            operation = operation.name(),
            repositories = repositories.len(),
            "starting run"
        );

        run_hooks(hooks, Phase::Before, operation, env, repositories);
        logger.reset(repositories.len());

        for repo in repositories.iter() {
            logger.advance();
            let cells = match table.construct(operation, repo, env, family, &**probe) {
                Ok(command) => {
                    let mut ctx = RunContext {
                        env,
                        family,
                        shell: &**shell,
                        probe: &**probe,
                        logger: &mut *logger,
                    };
                    command.run(&mut ctx).await
                }
                Err(e) => {
                    tracing::warn!(repo = %repo.name, error = %e, "could not construct command");
                    vec![CellResult {
                        cell: Cell::single(),
                        result: CommandResult::error(e.to_string()),
                    }]
                }
            };
            results.record(&repo.name, cells);
        }

        run_hooks(hooks, Phase::After, operation, env, repositories);

        let tally = results.tally();
        tracing::info!(
            run_id = %results.run_id,
            pass = tally.pass,
            fail = tally.fail,
            skip = tally.skip,
            "run finished"
        );
        results
    }
}
