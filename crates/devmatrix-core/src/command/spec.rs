//! Spec runs over the interpreter x adapter matrix.

use async_trait::async_trait;

use crate::command::bundle::{self, bundle_variables, lock_for, ManifestGate, RvmBundleLine};
use crate::command::{
    Axes, Command, EnvironmentBuilder, OperationKind, Preparation, RunContext, SkipPolicy, UnitContext,
};
use crate::environment::Environment;
use crate::error::{MatrixError, Result};
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::repository::Repository;
use crate::result::{SkipReason, Status};

pub fn build(repo: &Repository, _env: &Environment, family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::Spec,
        repo,
        "spec",
        repo.path.clone(),
        RvmBundleLine {
            args: "exec rake spec",
            install_options: false,
        },
    )
    .with_axes(Axes::Matrix)
    .with_environment(SpecEnvironment)
    .with_gate(ManifestGate)
    .with_skip_policy(MatrixSkip)
    .with_throttle(family.throttle)
    .prepare_per_ruby(InstallIfUnlocked)
}

/// Bundle variables plus `ADAPTER` and `TZ`, then the family extras.
struct SpecEnvironment;

impl EnvironmentBuilder for SpecEnvironment {
    fn variables(&self, unit: &UnitContext<'_>) -> Vec<(String, String)> {
        let mut vars = bundle_variables(unit);
        vars.push(("ADAPTER".to_string(), unit.adapter().to_string()));
        vars.push(("TZ".to_string(), "utc".to_string()));
        vars.extend(unit.family.extra_variables(unit.env, unit.ruby()));
        vars
    }
}

/// Whole rows are skipped when a revision was requested but the tree has
/// local changes; single cells when their adapter is unavailable here.
pub struct MatrixSkip;

impl SkipPolicy for MatrixSkip {
    fn skip_row(
        &self,
        repo: &Repository,
        env: &Environment,
        probe: &dyn WorkspaceProbe,
        _ruby: &str,
    ) -> Option<SkipReason> {
        if env.revision.is_some() && !probe.is_clean(&repo.path) {
            Some(SkipReason::DirtyWorkingTree)
        } else {
            None
        }
    }

    fn skip_cell(&self, unit: &UnitContext<'_>, _probe: &dyn WorkspaceProbe) -> Option<SkipReason> {
        if unit.env.is_available(unit.adapter()) {
            None
        } else {
            Some(SkipReason::AdapterUnavailable)
        }
    }
}

/// Install dependencies for the version first when it has no lock file yet.
struct InstallIfUnlocked;

#[async_trait]
impl Preparation for InstallIfUnlocked {
    async fn prepare(&self, ctx: &mut RunContext<'_>, command: &Command, ruby: Option<&str>) -> Result<()> {
        let Some(ruby) = ruby else {
            return Ok(());
        };
        if ctx.probe.is_file(&command.working_dir.join(lock_for(ruby))) {
            return Ok(());
        }
        tracing::debug!(repo = %command.repo.name, ruby, "no lock file, installing first");
        let install = bundle::install(&command.repo, ctx.env, ctx.family, ctx.probe);
        let rubies = [ruby.to_string()];
        // No unit lines while the spec grid is being drawn.
        let results = if ctx.logger.shows_commands() {
            install.run_rubies(ctx, &rubies).await
        } else {
            install.run_quiet(ctx, &rubies).await
        };

        match results.into_iter().find(|r| r.result.status == Status::Fail) {
            Some(failed) => Err(MatrixError::Install {
                repo: command.repo.name.clone(),
                ruby: ruby.to_string(),
                detail: failed
                    .result
                    .output
                    .filter(|output| !output.trim().is_empty())
                    .unwrap_or_else(|| "non-zero exit".to_string()),
            }),
            None => Ok(()),
        }
    }
}
