//! Release, implode and status.

use crate::command::{Command, CommandLineBuilder, OperationKind, UnitContext};
use crate::environment::Environment;
use crate::error::Result;
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::repository::Repository;
use crate::shell::{quote, OutputMode};

/// A command line that does not depend on the unit.
struct Fixed(&'static str);

impl CommandLineBuilder for Fixed {
    fn build(&self, _unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Remove ignored build artifacts, then publish.
pub fn release(repo: &Repository, _env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::Release,
        repo,
        "Releasing",
        repo.path.clone(),
        Fixed("git clean -dfX --quiet; rake release"),
    )
}

/// Delete the checkout. Runs from the root.
pub fn implode(repo: &Repository, env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::Implode,
        repo,
        "Deleting",
        env.root.clone(),
        RemoveCheckout,
    )
}

struct RemoveCheckout;

impl CommandLineBuilder for RemoveCheckout {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        Ok(format!("rm -rf {}", quote(&unit.repo.name)))
    }
}

/// `git status`, shown on the console unless output is captured or silenced.
pub fn status(repo: &Repository, env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    let output = if env.flags.capture_output {
        OutputMode::Capture
    } else if env.flags.silent {
        OutputMode::Discard
    } else {
        OutputMode::Stream
    };
    Command::new(
        OperationKind::Status,
        repo,
        "Status",
        repo.path.clone(),
        Fixed("git status"),
    )
    .with_output(output)
    .read_only()
}
