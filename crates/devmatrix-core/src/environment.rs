//! Resolved configuration snapshot for one invocation.
//!
//! Every field follows the same precedence: an explicit option wins over a
//! process variable, which wins over the built-in (family) default. The
//! variable source is injectable so resolution stays testable.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::family::Family;

/// Explicit call-site options. `None` falls through to variables/defaults.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    pub root: Option<PathBuf>,
    pub bundle_root: Option<PathBuf>,
    pub registry: Option<PathBuf>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub rubies: Option<Vec<String>>,
    pub adapters: Option<Vec<String>>,
    pub available_adapters: Option<Vec<String>>,
    pub gemset: Option<String>,
    pub source: Option<String>,
    pub revision: Option<String>,
    pub verbose: Option<bool>,
    pub pretend: Option<bool>,
    pub silent: Option<bool>,
    pub benchmark: Option<bool>,
    pub capture_output: Option<bool>,
    pub development: Option<bool>,
}

/// Boolean switches of an [`Environment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub verbose: bool,
    /// Dry-run: log mutating steps without executing them.
    pub pretend: bool,
    pub silent: bool,
    pub benchmark: bool,
    pub capture_output: bool,
    /// Clone with push-capable remotes.
    pub development: bool,
}

impl Flags {
    /// Verbose and dry-run both print literal command lines.
    pub fn shows_commands(&self) -> bool {
        self.verbose || self.pretend
    }
}

/// Immutable configuration shared by every command of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Family name this environment was resolved for.
    pub name: String,
    pub root: PathBuf,
    /// Dependency storage root; one subdirectory per interpreter version.
    pub bundle_root: PathBuf,
    pub registry_path: PathBuf,
    /// `None` means every registered repository.
    pub included: Option<Vec<String>>,
    pub excluded: Vec<String>,
    pub rubies: Vec<String>,
    /// Requested adapters.
    pub adapters: Vec<String>,
    /// Adapters usable on this machine; cells outside it are skipped.
    pub available_adapters: Vec<String>,
    /// Isolated runtime environment (rvm gemset) name.
    pub gemset: Option<String>,
    /// Dependency-source mode handed to family builds.
    pub source: Option<String>,
    /// Target revision requested by the caller (CI jobs always set it).
    pub revision: Option<String>,
    pub flags: Flags,
}

impl Environment {
    /// Resolve against the real process environment and working directory.
    pub fn from_process(family: &Family, options: &EnvOptions) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::resolve(family, options, &cwd, |key| {
            std::env::var(key).ok()
        }))
    }

    /// Resolve with an explicit variable source and working directory.
    pub fn resolve<F>(family: &Family, options: &EnvOptions, cwd: &Path, vars: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| vars(key).filter(|v| !v.trim().is_empty());
        let list = |key: &str| var(key).map(|v| normalize(&v));
        let flag = |explicit: Option<bool>, key: &str| {
            explicit.unwrap_or_else(|| var(key).map(|v| truthy(&v)).unwrap_or(false))
        };

        let root = options
            .root
            .clone()
            .or_else(|| var(&family.var("ROOT")).map(PathBuf::from))
            .map(|p| absolutize(cwd, p))
            .unwrap_or_else(|| cwd.to_path_buf());

        let bundle_root = options
            .bundle_root
            .clone()
            .or_else(|| var(&family.var("BUNDLE_ROOT")).map(PathBuf::from))
            .map(|p| absolutize(cwd, p))
            .unwrap_or_else(|| root.join(".bundle_root"));

        let registry_path = options
            .registry
            .clone()
            .or_else(|| var(&family.var("REGISTRY")).map(PathBuf::from))
            .map(|p| absolutize(cwd, p))
            .unwrap_or_else(|| root.join(".devmatrix").join("registry.json"));

        let included = options.include.clone().or_else(|| list("INCLUDE"));
        let excluded = options
            .exclude
            .clone()
            .or_else(|| list("EXCLUDE"))
            .unwrap_or_else(|| family.default_excluded.clone());
        let rubies = options
            .rubies
            .clone()
            .or_else(|| list("RUBIES"))
            .unwrap_or_else(|| family.default_rubies.clone());
        let adapters = options
            .adapters
            .clone()
            .or_else(|| list("ADAPTERS"))
            .unwrap_or_else(|| family.default_adapters.clone());
        // Families without known adapters treat every requested one as available.
        let available_adapters = options
            .available_adapters
            .clone()
            .or_else(|| list("AVAILABLE_ADAPTERS"))
            .unwrap_or_else(|| {
                if family.default_adapters.is_empty() {
                    adapters.clone()
                } else {
                    family.default_adapters.clone()
                }
            });

        let flags = Flags {
            verbose: flag(options.verbose, "VERBOSE"),
            pretend: flag(options.pretend, "PRETEND"),
            silent: flag(options.silent, "SILENT"),
            benchmark: flag(options.benchmark, "BENCHMARK"),
            capture_output: flag(options.capture_output, "CAPTURE_OUTPUT"),
            development: flag(options.development, "DEVELOPMENT"),
        };

        Self {
            name: family.name.clone(),
            root,
            bundle_root,
            registry_path,
            included,
            excluded,
            rubies,
            adapters,
            available_adapters,
            gemset: options.gemset.clone().or_else(|| var("GEMSET")),
            source: options.source.clone().or_else(|| var("SOURCE")),
            revision: options.revision.clone().or_else(|| var("REVISION")),
            flags,
        }
    }

    /// Dependency storage for one interpreter version.
    pub fn bundle_path(&self, ruby: &str) -> PathBuf {
        self.bundle_root.join(ruby)
    }

    /// rvm interpreter selector, scoped to the gemset when one is configured.
    pub fn rvm_target(&self, ruby: &str) -> String {
        match &self.gemset {
            Some(gemset) => format!("{ruby}@{gemset}"),
            None => ruby.to_string(),
        }
    }

    pub fn is_available(&self, adapter: &str) -> bool {
        self.available_adapters.iter().any(|a| a == adapter)
    }
}

/// Split a list variable on commas and/or whitespace.
pub fn normalize(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn absolutize(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
