//! Package build/install/uninstall and gemset management.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::command::{Axes, Command, CommandLineBuilder, OperationKind, Preparation, RunContext, UnitContext};
use crate::environment::Environment;
use crate::error::{MatrixError, Result};
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::repository::Repository;
use crate::shell::{Invocation, OutputMode};

/// Read the package version from the checkout. Never cached: a release bump
/// between two calls is picked up.
///
/// Sources, in order: `.version = '<v>'` in `<name>.gemspec`, a
/// `VERSION = '<v>'` constant in `lib/<name>/version.rb`, a `VERSION` file.
pub fn package_version(repo_dir: &Path, name: &str) -> Result<String> {
    let spec_error = |detail: String| MatrixError::PackageSpec {
        repo: name.to_string(),
        detail,
    };

    let gemspec = repo_dir.join(format!("{name}.gemspec"));
    if let Ok(source) = std::fs::read_to_string(&gemspec) {
        let pattern = Regex::new(r#"\.version\s*=\s*['"]([^'"]+)['"]"#)
            .map_err(|e| spec_error(e.to_string()))?;
        if let Some(caps) = pattern.captures(&source) {
            return Ok(caps[1].to_string());
        }
    }

    let version_rb = repo_dir.join("lib").join(name).join("version.rb");
    if let Ok(source) = std::fs::read_to_string(&version_rb) {
        let pattern = Regex::new(r#"VERSION\s*=\s*['"]([^'"]+)['"]"#)
            .map_err(|e| spec_error(e.to_string()))?;
        if let Some(caps) = pattern.captures(&source) {
            return Ok(caps[1].to_string());
        }
    }

    if let Ok(raw) = std::fs::read_to_string(repo_dir.join("VERSION")) {
        let version = raw.trim();
        if !version.is_empty() {
            return Ok(version.to_string());
        }
    }

    Err(spec_error(format!(
        "no version found in {}",
        gemspec.display()
    )))
}

pub fn install(repo: &Repository, _env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::GemInstall,
        repo,
        "gem install",
        repo.path.clone(),
        GemInstallLine,
    )
    .with_axes(Axes::Rubies)
    .prepare_once(EnsureGemset)
}

pub fn uninstall(repo: &Repository, _env: &Environment, _family: &Family, _probe: &dyn WorkspaceProbe) -> Command {
    Command::new(
        OperationKind::GemUninstall,
        repo,
        "gem uninstall",
        repo.path.clone(),
        GemUninstallLine,
    )
    .with_axes(Axes::Rubies)
    .prepare_once(EnsureGemset)
}

struct GemInstallLine;

impl CommandLineBuilder for GemInstallLine {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        let name = &unit.repo.name;
        let version = package_version(&unit.repo.path, name)?;
        Ok(format!(
            "rvm {} exec bash -c \"gem build {name}.gemspec && gem install {name}-{version}.gem\"",
            unit.env.rvm_target(unit.ruby())
        ))
    }
}

struct GemUninstallLine;

impl CommandLineBuilder for GemUninstallLine {
    fn build(&self, unit: &UnitContext<'_>, _vars: &[(String, String)]) -> Result<String> {
        let name = &unit.repo.name;
        let version = package_version(&unit.repo.path, name)?;
        Ok(format!(
            "rvm {} exec bash -c \"gem uninstall {name} --version {version}\"",
            unit.env.rvm_target(unit.ruby())
        ))
    }
}

/// Create the configured gemset for every interpreter version that lacks
/// it. An existing gemset is left alone.
pub struct EnsureGemset;

#[async_trait]
impl Preparation for EnsureGemset {
    async fn prepare(&self, ctx: &mut RunContext<'_>, command: &Command, _ruby: Option<&str>) -> Result<()> {
        let env = ctx.env;
        let Some(gemset) = env.gemset.as_deref() else {
            return Ok(());
        };

        for ruby in &env.rubies {
            let create = format!("rvm {ruby} gemset create {gemset}");
            if env.flags.pretend {
                ctx.logger
                    .log(&command.repo.name, &format!("[{ruby}] gemset"), None, Some(&create));
                continue;
            }

            let listing = ctx
                .shell
                .execute(&Invocation {
                    working_dir: env.root.clone(),
                    command_line: format!("rvm {ruby} gemset list"),
                    output: OutputMode::Capture,
                })
                .await?;
            let existing = listing.output.unwrap_or_default();
            if listing.success && gemset_listed(&existing, gemset) {
                tracing::debug!(ruby = %ruby, gemset, "gemset exists");
                continue;
            }

            ctx.logger
                .log(&command.repo.name, &format!("[{ruby}] gemset"), None, Some(&create));
            let outcome = ctx
                .shell
                .execute(&Invocation {
                    working_dir: env.root.clone(),
                    command_line: create,
                    output: OutputMode::from_flags(&env.flags),
                })
                .await?;
            if !outcome.success {
                return Err(MatrixError::Shell(format!(
                    "could not create gemset {gemset} for {ruby}"
                )));
            }
        }
        Ok(())
    }
}

/// Whether `rvm gemset list` output names the gemset. The current gemset is
/// prefixed with `=>`.
fn gemset_listed(listing: &str, gemset: &str) -> bool {
    listing
        .lines()
        .map(|line| line.trim().trim_start_matches("=>").trim())
        .any(|name| name == gemset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_version_from_gemspec() {
        let dir = repo_dir();
        std::fs::write(
            dir.path().join("dm-core.gemspec"),
            "Gem::Specification.new do |s|\n  s.name = 'dm-core'\n  s.version = '1.0.2'\nend\n",
        )
        .unwrap();
        assert_eq!(package_version(dir.path(), "dm-core").unwrap(), "1.0.2");
    }

    #[test]
    fn test_version_falls_back_to_version_rb_then_file() {
        let dir = repo_dir();
        std::fs::write(dir.path().join("dm-core.gemspec"), "s.version = DataMapper::VERSION\n").unwrap();
        std::fs::write(dir.path().join("VERSION"), "0.9.0\n").unwrap();
        assert_eq!(package_version(dir.path(), "dm-core").unwrap(), "0.9.0");

        let lib = dir.path().join("lib").join("dm-core");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("version.rb"), "module DataMapper\n  VERSION = \"1.1.0\"\nend\n").unwrap();
        assert_eq!(package_version(dir.path(), "dm-core").unwrap(), "1.1.0");
    }

    #[test]
    fn test_version_is_reread_every_call() {
        let dir = repo_dir();
        std::fs::write(dir.path().join("VERSION"), "1.0.0").unwrap();
        assert_eq!(package_version(dir.path(), "dm-types").unwrap(), "1.0.0");
        std::fs::write(dir.path().join("VERSION"), "1.0.1").unwrap();
        assert_eq!(package_version(dir.path(), "dm-types").unwrap(), "1.0.1");
    }

    #[test]
    fn test_missing_version_is_package_spec_error() {
        let dir = repo_dir();
        assert!(matches!(
            package_version(dir.path(), "dm-core"),
            Err(MatrixError::PackageSpec { .. })
        ));
    }

    #[test]
    fn test_gemset_listing() {
        let listing = "\ngemsets for ruby-1.9.2-p180\n   (default)\n   global\n=> datamapper\n";
        assert!(gemset_listed(listing, "datamapper"));
        assert!(gemset_listed(listing, "global"));
        assert!(!gemset_listed(listing, "rails"));
    }
}
