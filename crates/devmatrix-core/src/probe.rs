//! Workspace state probing.
//!
//! Command resolution and skip policies only look at the filesystem through
//! [`WorkspaceProbe`], so tests can fake checkouts, revisions and dirty trees.

use std::path::Path;
use std::process::Command;

use crate::error::{MatrixError, Result};

/// Read-only view of local checkouts.
pub trait WorkspaceProbe: Send + Sync {
    fn is_directory(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    /// HEAD commit of the checkout at `path`, if it is a git work tree.
    fn head_revision(&self, path: &Path) -> Option<String>;

    /// Whether tracked files have no uncommitted changes.
    fn is_clean(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem and the `git` binary.
///
/// Git calls block the calling task. Probes run between units, never while a
/// unit's subprocess is in flight.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitProbe;

impl GitProbe {
    /// Trimmed stdout of `git <args>` run inside `repo_dir`.
    fn git(&self, repo_dir: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .map_err(|e| MatrixError::Shell(format!("git {}: {e}", args.join(" "))))?;
        if !output.status.success() {
            return Err(MatrixError::Shell(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl WorkspaceProbe for GitProbe {
    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn head_revision(&self, path: &Path) -> Option<String> {
        match self.git(path, &["rev-parse", "--verify", "HEAD"]) {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no HEAD revision");
                None
            }
        }
    }

    /// Only tracked files count. Per-version manifests and locks written
    /// next to `Gemfile` are untracked and never make a tree dirty.
    fn is_clean(&self, path: &Path) -> bool {
        match self.git(path, &["status", "--porcelain", "--untracked-files=no"]) {
            Ok(changes) => changes.is_empty(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot read working tree state");
                false
            }
        }
    }
}
