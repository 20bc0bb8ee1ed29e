//! Managed repositories and run-time selection of the participating set.

use std::path::{Component, Path, PathBuf};

use reqwest::Url;
use serde::Serialize;

use crate::environment::Environment;
use crate::family::Family;
use crate::probe::WorkspaceProbe;
use crate::registry::Registry;

/// Master dependency manifest every installable repository carries.
pub const MANIFEST: &str = "Gemfile";

/// One managed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub name: String,
    /// Always `<root>/<name>`.
    pub path: PathBuf,
    pub uri: String,
}

impl Repository {
    pub fn new(root: &Path, name: impl Into<String>, uri: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: root.join(&name),
            name,
            uri: uri.into(),
        }
    }

    /// Whether the checkout has a dependency manifest. Re-evaluated each call.
    pub fn installable(&self, probe: &dyn WorkspaceProbe) -> bool {
        probe.is_file(&self.path.join(MANIFEST))
    }

    /// Remote to clone from. Development mode rewrites an https remote into
    /// its push-capable ssh form: `https://host/owner/name` becomes
    /// `git@host:owner/name.git`.
    pub fn clone_uri(&self, development: bool) -> String {
        if !development {
            return self.uri.clone();
        }
        match Url::parse(&self.uri) {
            Ok(url) if matches!(url.scheme(), "https" | "http") => match url.host_str() {
                Some(host) => {
                    let path = url.path().trim_matches('/');
                    let path = path.strip_suffix(".git").unwrap_or(path);
                    format!("git@{host}:{path}.git")
                }
                None => self.uri.clone(),
            },
            _ => self.uri.clone(),
        }
    }
}

/// Resolves which repositories take part in a run.
pub struct RepositorySet;

impl RepositorySet {
    /// Select repositories, in registry order.
    ///
    /// An explicit include filter wins. Without one, running from inside
    /// `<root>/<name>` narrows to that single repository. Otherwise every
    /// registered repository minus the configured and always-excluded names.
    pub fn resolve(
        registry: &Registry,
        env: &Environment,
        family: &Family,
        cwd: &Path,
    ) -> Vec<Repository> {
        let all = registry
            .repositories
            .iter()
            .map(|entry| Repository::new(&env.root, &entry.name, &entry.url));

        if let Some(included) = &env.included {
            for name in included {
                if registry.get(name).is_none() {
                    tracing::warn!(repo = %name, "included repository is not registered");
                }
            }
            return all.filter(|r| included.contains(&r.name)).collect();
        }

        if let Some(local) = local_repository_name(&env.root, cwd) {
            if registry.get(&local).is_some() {
                tracing::debug!(repo = %local, "narrowing to current repository");
                return all.filter(|r| r.name == local).collect();
            }
        }

        all.filter(|r| {
            !env.excluded.contains(&r.name) && !family.always_excluded.contains(&r.name)
        })
        .collect()
    }
}

/// `<root>/<name>/...` -> `name`.
fn local_repository_name(root: &Path, cwd: &Path) -> Option<String> {
    let relative = cwd.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}
