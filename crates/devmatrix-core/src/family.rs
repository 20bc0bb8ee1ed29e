//! Project-family profiles.
//!
//! A family bundles the defaults and quirks shared by every repository of one
//! project: the variable prefix used for configuration, the default
//! interpreter/adapter axes, repositories that never participate, extra
//! subprocess variables and default lifecycle hooks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::OperationKind;
use crate::environment::Environment;
use crate::error::{MatrixError, Result};
use crate::hooks::LifecycleHook;

/// Built-in family behaviours that go beyond plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    Custom,
    DataMapper,
}

/// Defaults and extras for one family of repositories.
#[derive(Debug, Clone)]
pub struct Family {
    pub kind: FamilyKind,
    pub name: String,
    /// Prefix for family-scoped variables, e.g. `DM_DEV` -> `DM_DEV_ROOT`.
    pub var_prefix: String,
    pub default_rubies: Vec<String>,
    pub default_adapters: Vec<String>,
    /// Excluded when no explicit exclude list is configured.
    pub default_excluded: Vec<String>,
    /// Excluded on top of whatever exclude list is configured.
    pub always_excluded: Vec<String>,
    /// Repositories the dependency-manifest commands never touch.
    pub ignored_repos: Vec<String>,
    pub install_options: Option<String>,
    /// Delay before each dependency-manifest or spec subprocess.
    pub throttle: Duration,
}

impl Family {
    /// A family with no defaults, no extras and no throttle.
    pub fn new(name: impl Into<String>, var_prefix: impl Into<String>) -> Self {
        Self {
            kind: FamilyKind::Custom,
            name: name.into(),
            var_prefix: var_prefix.into(),
            default_rubies: Vec::new(),
            default_adapters: Vec::new(),
            default_excluded: Vec::new(),
            always_excluded: Vec::new(),
            ignored_repos: Vec::new(),
            install_options: None,
            throttle: Duration::ZERO,
        }
    }

    /// The DataMapper family: ruby ORM core plus its adapter and plugin gems.
    pub fn datamapper() -> Self {
        Self {
            kind: FamilyKind::DataMapper,
            name: "datamapper".to_string(),
            var_prefix: "DM_DEV".to_string(),
            default_rubies: strings(&["1.8.7", "1.9.2"]),
            default_adapters: strings(&["in_memory", "yaml", "sqlite", "postgres", "mysql"]),
            default_excluded: strings(&["dm-oracle-adapter", "dm-sqlserver-adapter"]),
            always_excluded: strings(&["dm-more"]),
            ignored_repos: strings(&[
                "dm-dev",
                "data_mapper",
                "datamapper.github.com",
                "dm-ferret-adapter",
                "rails_datamapper",
            ]),
            install_options: Some("--without quality".to_string()),
            throttle: Duration::from_secs(2),
        }
    }

    /// Neutral family: everything comes from options and variables.
    pub fn generic() -> Self {
        Self::new("generic", "DEVMATRIX")
    }

    /// Look up a built-in family by name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "datamapper" | "dm" => Ok(Self::datamapper()),
            "generic" => Ok(Self::generic()),
            other => Err(MatrixError::UnknownFamily(other.to_string())),
        }
    }

    /// Family-scoped variable name, e.g. `var("ROOT")` -> `DM_DEV_ROOT`.
    pub fn var(&self, suffix: &str) -> String {
        format!("{}_{}", self.var_prefix, suffix)
    }

    pub fn is_ignored(&self, repo_name: &str) -> bool {
        self.ignored_repos.iter().any(|r| r == repo_name)
    }

    /// Extra `KEY=value` pairs handed to every dependency/spec subprocess.
    pub fn extra_variables(&self, env: &Environment, ruby: &str) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(source) = &env.source {
            vars.push(("SOURCE".to_string(), source.clone()));
        }
        if self.kind == FamilyKind::DataMapper {
            if ruby == "1.8.6" {
                vars.push(("EXTLIB".to_string(), "true".to_string()));
            }
            vars.push(("ADAPTERS".to_string(), env.adapters.join(",")));
        }
        vars
    }

    /// Lifecycle hooks the family registers around whole operations.
    pub fn default_hooks(&self) -> Vec<LifecycleHook> {
        match self.kind {
            FamilyKind::DataMapper => vec![purge_bundle_root()],
            FamilyKind::Custom => Vec::new(),
        }
    }
}

/// Imploding the whole fleet also drops the shared dependency storage.
fn purge_bundle_root() -> LifecycleHook {
    LifecycleHook::before("purge-bundle-root", OperationKind::Implode, |env, _repos| {
        if env.included.is_some() {
            return Ok(());
        }
        if env.flags.pretend {
            tracing::info!(path = %env.bundle_root.display(), "would remove bundle root");
            return Ok(());
        }
        if env.bundle_root.exists() {
            tracing::info!(path = %env.bundle_root.display(), "removing bundle root");
            std::fs::remove_dir_all(&env.bundle_root)?;
        }
        Ok(())
    })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datamapper_defaults() {
        let family = Family::datamapper();
        assert_eq!(family.var("ROOT"), "DM_DEV_ROOT");
        assert_eq!(family.default_adapters.len(), 5);
        assert!(family.always_excluded.contains(&"dm-more".to_string()));
        assert!(family.is_ignored("dm-dev"));
        assert!(!family.is_ignored("dm-core"));
    }

    #[test]
    fn test_by_name() {
        assert_eq!(Family::by_name("dm").unwrap().kind, FamilyKind::DataMapper);
        assert_eq!(Family::by_name("generic").unwrap().var("ROOT"), "DEVMATRIX_ROOT");
        assert!(matches!(
            Family::by_name("rails"),
            Err(MatrixError::UnknownFamily(_))
        ));
    }

    #[test]
    fn test_custom_family_has_no_hooks() {
        let family = Family::new("acme", "ACME");
        assert!(family.default_hooks().is_empty());
        assert_eq!(family.throttle, Duration::ZERO);
    }
}
