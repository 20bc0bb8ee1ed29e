//! Persistent list of managed repositories.
//!
//! Stored as a JSON array of `{name, url}` objects and rewritten whole on
//! every save.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MatrixError, Result};

const GITHUB_API: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

/// One registered repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub url: String,
}

impl RegistryEntry {
    /// Derive the entry name from the URL basename.
    pub fn from_url(url: &str) -> Self {
        let trimmed = url.trim_end_matches('/');
        let base = trimmed
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(trimmed);
        let name = base.strip_suffix(".git").unwrap_or(base);
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub repositories: Vec<RegistryEntry>,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    html_url: String,
}

impl Registry {
    /// Load the registry. Missing or unparseable files are a configuration
    /// error that aborts the run.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MatrixError::ConfigurationMissing(format!("{}: {e}", path.display()))
        })?;
        let repositories: Vec<RegistryEntry> = serde_json::from_str(&raw).map_err(|e| {
            MatrixError::ConfigurationMissing(format!("{}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), count = repositories.len(), "loaded registry");
        Ok(Self {
            repositories,
            path: path.to_path_buf(),
        })
    }

    /// Like [`Registry::load`], but a missing file yields an empty registry.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self {
                repositories: Vec::new(),
                path: path.to_path_buf(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.repositories.iter().find(|e| e.name == name)
    }

    /// Register a URL. Returns false when the URL is already present.
    pub fn add(&mut self, url: &str) -> bool {
        self.add_entry(RegistryEntry::from_url(url))
    }

    /// Register an entry. Duplicate URLs or names are ignored.
    pub fn add_entry(&mut self, entry: RegistryEntry) -> bool {
        if self
            .repositories
            .iter()
            .any(|e| e.url == entry.url || e.name == entry.name)
        {
            return false;
        }
        self.repositories.push(entry);
        true
    }

    pub fn save(&self) -> Result<()> {
        let failed = |e: &dyn std::fmt::Display| {
            MatrixError::Registry(format!("cannot write {}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| failed(&e))?;
        }
        let json = serde_json::to_string_pretty(&self.repositories).map_err(|e| failed(&e))?;
        std::fs::write(&self.path, json).map_err(|e| failed(&e))?;
        tracing::debug!(path = %self.path.display(), "saved registry");
        Ok(())
    }

    /// Register every public repository of a GitHub user or organisation.
    /// Returns the number of newly added entries.
    pub async fn import_github(&mut self, client: &reqwest::Client, user: &str) -> Result<usize> {
        self.import_github_from(client, GITHUB_API, user).await
    }

    pub async fn import_github_from(
        &mut self,
        client: &reqwest::Client,
        api_base: &str,
        user: &str,
    ) -> Result<usize> {
        let mut added = 0;
        let mut page = 1;
        loop {
            let url = format!(
                "{}/users/{user}/repos?per_page={PAGE_SIZE}&page={page}",
                api_base.trim_end_matches('/')
            );
            let response = client
                .get(&url)
                .header(reqwest::header::USER_AGENT, concat!("devmatrix/", env!("CARGO_PKG_VERSION")))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(MatrixError::ConfigurationMissing(format!(
                    "GET {url} returned {}",
                    response.status()
                )));
            }
            let repos: Vec<GithubRepo> = response.json().await?;
            let count = repos.len();
            for repo in repos {
                if self.add(&repo.html_url) {
                    added += 1;
                }
            }
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        tracing::info!(user, added, "imported repositories from GitHub");
        Ok(added)
    }
}
