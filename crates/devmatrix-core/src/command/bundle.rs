//! Dependency-manifest commands: `bundle install|update|show` and force.
//!
//! Each interpreter version gets its own manifest copy (`Gemfile.<ruby>`)
//! and its own dependency storage directory (`<bundle_root>/<ruby>`).

use std::path::Path;

use async_trait::async_trait;

use crate::command::gem::EnsureGemset;
use crate::command::{
    Axes, Command, CommandLineBuilder, EnvironmentBuilder, ExecutableGate, OperationKind, Preparation,
    RunContext, UnitContext,
};
use crate::environment::Environment;
use crate::error::Result;
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::repository::{Repository, MANIFEST};
use crate::result::SkipReason;
use crate::shell::{env_prefix, quote};

/// Per-version manifest file name.
pub fn manifest_for(ruby: &str) -> String {
    format!("{MANIFEST}.{ruby}")
}

/// Per-version lock file name.
pub fn lock_for(ruby: &str) -> String {
    format!("{MANIFEST}.{ruby}.lock")
}

/// Copy `Gemfile` to `Gemfile.<ruby>` unless the copy already exists.
/// Returns whether a file was written.
pub fn materialize_manifest(repo_dir: &Path, ruby: &str) -> Result<bool> {
    let target = repo_dir.join(manifest_for(ruby));
    if target.is_file() {
        return Ok(false);
    }
    std::fs::copy(repo_dir.join(MANIFEST), &target)?;
    tracing::debug!(path = %target.display(), "materialized manifest");
    Ok(true)
}

pub fn install(repo: &Repository, env: &Environment, family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    manifest_command(OperationKind::BundleInstall, repo, env, family, "bundle install", "install", true)
        .prepare_once(EnsureGemset)
}

pub fn update(repo: &Repository, env: &Environment, family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    manifest_command(OperationKind::BundleUpdate, repo, env, family, "bundle update", "update", false)
}

pub fn show(repo: &Repository, env: &Environment, family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    manifest_command(OperationKind::BundleShow, repo, env, family, "bundle show", "show", false)
}

/// Drop the per-version manifests and locks so the next install regenerates them.
pub fn force(repo: &Repository, _env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::BundleForce,
        repo,
        "bundle force",
        repo.path.clone(),
        RemoveManifests,
    )
    .with_axes(Axes::Rubies)
    .with_gate(ManifestGate)
}

fn manifest_command(
    kind: OperationKind,
    repo: &Repository,
    _env: &Environment,
    family: &Family,
    action: &str,
    subcommand: &'static str,
    install_options: bool,
) -> Command {
    Command::new(
        kind,
        repo,
        action,
        repo.path.clone(),
        RvmBundleLine {
            args: subcommand,
            install_options,
        },
    )
    .with_axes(Axes::Rubies)
    .with_environment(BundleEnvironment)
    .with_gate(ManifestGate)
    .with_throttle(family.throttle)
    .prepare_once(EnsureBundlePaths)
    .prepare_per_ruby(MaterializeManifest)
}

/// Ignored repositories and checkouts without a manifest never shell out.
pub struct ManifestGate;

impl ExecutableGate for ManifestGate {
    fn check(&self, repo: &Repository, family: &Family, probe: &dyn WorkspaceProbe) -> Option<SkipReason> {
        if family.is_ignored(&repo.name) {
            Some(SkipReason::Ignored)
        } else if !probe.is_directory(&repo.path) {
            Some(SkipReason::Unknown)
        } else if !repo.installable(probe) {
            Some(SkipReason::MissingManifest)
        } else {
            None
        }
    }
}

/// `BUNDLE_PATH`, `BUNDLE_GEMFILE` and the family extras.
pub struct BundleEnvironment;

impl EnvironmentBuilder for BundleEnvironment {
    fn variables(&self, unit: &UnitContext<'_>) -> Vec<(String, String)> {
        let mut vars = bundle_variables(unit);
        vars.extend(unit.family.extra_variables(unit.env, unit.ruby()));
        vars
    }
}

pub(crate) fn bundle_variables(unit: &UnitContext<'_>) -> Vec<(String, String)> {
    let ruby = unit.ruby();
    vec![
        (
            "BUNDLE_PATH".to_string(),
            unit.env.bundle_path(ruby).display().to_string(),
        ),
        ("BUNDLE_GEMFILE".to_string(), manifest_for(ruby)),
    ]
}

/// `rvm <ruby> exec bash -c "<vars> bundle <args>"`.
pub struct RvmBundleLine {
    pub args: &'static str,
    pub install_options: bool,
}

impl CommandLineBuilder for RvmBundleLine {
    fn build(&self, unit: &UnitContext<'_>, vars: &[(String, String)]) -> Result<String> {
        let mut inner = env_prefix(vars);
        if !inner.is_empty() {
            inner.push(' ');
        }
        inner.push_str("bundle ");
        inner.push_str(self.args);
        if self.install_options {
            if let Some(options) = &unit.family.install_options {
                inner.push(' ');
                inner.push_str(options);
            }
        }
        Ok(format!(
            "rvm {} exec bash -c \"{inner}\"",
            unit.env.rvm_target(unit.ruby())
        ))
    }
}

struct RemoveManifests;

impl CommandLineBuilder for RemoveManifests {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        let ruby = unit.ruby();
        Ok(format!(
            "rm -f {} {}",
            quote(&manifest_for(ruby)),
            quote(&lock_for(ruby))
        ))
    }
}

/// Create `<bundle_root>/<ruby>` for every configured version.
pub struct EnsureBundlePaths;

#[async_trait]
impl Preparation for EnsureBundlePaths {
    async fn prepare(&self, ctx: &mut RunContext<'_>, _command: &Command, _ruby: Option<&str>) -> Result<()> {
        let env = ctx.env;
        if env.flags.pretend {
            return Ok(());
        }
        for ruby in &env.rubies {
            tokio::fs::create_dir_all(env.bundle_path(ruby)).await?;
        }
        Ok(())
    }
}

/// Materialize `Gemfile.<ruby>` before the version's unit runs.
pub struct MaterializeManifest;

#[async_trait]
impl Preparation for MaterializeManifest {
    async fn prepare(&self, ctx: &mut RunContext<'_>, command: &Command, ruby: Option<&str>) -> Result<()> {
        let Some(ruby) = ruby else {
            return Ok(());
        };
        if ctx.env.flags.pretend {
            return Ok(());
        }
        materialize_manifest(&command.working_dir, ruby)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_names() {
        assert_eq!(manifest_for("1.9.2"), "Gemfile.1.9.2");
        assert_eq!(lock_for("1.9.2"), "Gemfile.1.9.2.lock");
    }

    #[test]
    fn test_materialize_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Gemfile"), "gem 'dm-core'\n").unwrap();

        assert!(materialize_manifest(dir.path(), "1.8.7").unwrap());
        std::fs::write(dir.path().join("Gemfile.1.8.7"), "edited\n").unwrap();
        assert!(!materialize_manifest(dir.path(), "1.8.7").unwrap());

        let contents = std::fs::read_to_string(dir.path().join("Gemfile.1.8.7")).unwrap();
        assert_eq!(contents, "edited\n");
    }

    #[test]
    fn test_materialize_without_master_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(materialize_manifest(dir.path(), "1.9.2").is_err());
    }
}
