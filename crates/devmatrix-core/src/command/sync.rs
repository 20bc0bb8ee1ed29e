//! Sync: clone a missing checkout or pull an existing one.

use crate::command::{Command, CommandLineBuilder, OperationKind, SkipPolicy, UnitContext};
use crate::environment::Environment;
use crate::error::Result;
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::repository::Repository;
use crate::result::SkipReason;
use crate::shell::quote;

/// Concrete behaviour a sync request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVariant {
    Clone,
    Pull,
}

/// Pick the variant from the current filesystem state.
pub fn resolve(repo: &Repository, probe: &dyn WorkspaceProbe) -> SyncVariant {
    if probe.is_directory(&repo.path) {
        SyncVariant::Pull
    } else {
        SyncVariant::Clone
    }
}

pub fn build(repo: &Repository, env: &Environment, _family: &Family, probe: &dyn WorkspaceProbe) -> Command {
    let variant = resolve(repo, probe);
    tracing::debug!(repo = %repo.name, ?variant, "resolved sync");
    match variant {
        SyncVariant::Clone => Command::new(
            OperationKind::Sync,
            repo,
            "Cloning",
            env.root.clone(),
            CloneLine,
        ),
        SyncVariant::Pull => Command::new(
            OperationKind::Sync,
            repo,
            "Pulling",
            repo.path.clone(),
            PullLine,
        )
        .with_skip_policy(AtRevision),
    }
}

struct CloneLine;

impl CommandLineBuilder for CloneLine {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        let uri = unit.repo.clone_uri(unit.env.flags.development);
        let mut line = format!("git clone {} {}", quote(&uri), quote(&unit.repo.name));
        if let Some(revision) = &unit.env.revision {
            line.push_str(&format!(
                " && git -C {} checkout {}",
                quote(&unit.repo.name),
                quote(revision)
            ));
        }
        Ok(line)
    }
}

struct PullLine;

impl CommandLineBuilder for PullLine {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        let mut line = "git checkout master; git pull --rebase".to_string();
        if let Some(revision) = &unit.env.revision {
            line.push_str(&format!(" && git checkout {}", quote(revision)));
        }
        Ok(line)
    }
}

/// Nothing to do when HEAD already is the requested revision.
struct AtRevision;

impl SkipPolicy for AtRevision {
    fn skip_cell(&self, unit: &UnitContext<'_>, probe: &dyn WorkspaceProbe) -> Option<SkipReason> {
        let wanted = unit.env.revision.as_deref()?;
        let head = probe.head_revision(&unit.repo.path)?;
        (head == wanted).then_some(SkipReason::AtRevision)
    }
}
