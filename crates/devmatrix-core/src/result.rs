//! Per-unit outcomes and the aggregated result map of a run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Skip => "skip",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a unit was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Repository is on the family ignore list.
    Ignored,
    /// No dependency manifest in the checkout.
    MissingManifest,
    /// Not executable for no recognised reason.
    Unknown,
    /// HEAD already equals the requested revision.
    AtRevision,
    /// A revision was requested but the working tree has local changes.
    DirtyWorkingTree,
    AdapterUnavailable,
}

impl SkipReason {
    pub fn explanation(&self) -> &'static str {
        match self {
            SkipReason::Ignored => "because it's ignored",
            SkipReason::MissingManifest => "because it's missing a Gemfile",
            SkipReason::Unknown => "reason unknown",
            SkipReason::AtRevision => "because it's already at the requested revision",
            SkipReason::DirtyWorkingTree => "because the working tree has uncommitted changes",
            SkipReason::AdapterUnavailable => "because the adapter is unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Absent when no subprocess ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl CommandResult {
    pub fn pass() -> Self {
        Self {
            status: Status::Pass,
            output: None,
            duration_ms: None,
            reason: None,
        }
    }

    pub fn skip(reason: SkipReason) -> Self {
        Self {
            status: Status::Skip,
            output: None,
            duration_ms: None,
            reason: Some(reason),
        }
    }

    /// A unit that could not run at all, e.g. the process failed to spawn.
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            output: Some(detail.into()),
            duration_ms: None,
            reason: None,
        }
    }
}

/// Coordinates of one unit within a repository's matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
}

impl Cell {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn ruby(ruby: &str) -> Self {
        Self {
            ruby: Some(ruby.to_string()),
            adapter: None,
        }
    }

    pub fn matrix(ruby: &str, adapter: &str) -> Self {
        Self {
            ruby: Some(ruby.to_string()),
            adapter: Some(adapter.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellResult {
    #[serde(flatten)]
    pub cell: Cell,
    #[serde(flatten)]
    pub result: CommandResult,
}

/// Ordered results of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryResults {
    pub repository: String,
    pub cells: Vec<CellResult>,
}

impl RepositoryResults {
    /// First non-skipped result, else the first result.
    pub fn primary(&self) -> Option<&CellResult> {
        self.cells
            .iter()
            .find(|c| c.result.status != Status::Skip)
            .or_else(|| self.cells.first())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
}

/// Result map of one operation over the selected repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub run_id: Uuid,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub repositories: Vec<RepositoryResults>,
}

impl RunResults {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation: operation.into(),
            started_at: Utc::now(),
            repositories: Vec::new(),
        }
    }

    /// Record a repository's results, in processing order.
    pub fn record(&mut self, repository: impl Into<String>, cells: Vec<CellResult>) {
        let repository = repository.into();
        match self.repositories.iter_mut().find(|r| r.repository == repository) {
            Some(existing) => existing.cells.extend(cells),
            None => self.repositories.push(RepositoryResults { repository, cells }),
        }
    }

    pub fn get(&self, repository: &str) -> Option<&RepositoryResults> {
        self.repositories.iter().find(|r| r.repository == repository)
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for cell in self.repositories.iter().flat_map(|r| &r.cells) {
            match cell.result.status {
                Status::Pass => tally.pass += 1,
                Status::Fail => tally.fail += 1,
                Status::Skip => tally.skip += 1,
            }
        }
        tally
    }

    /// Passed units over executed (pass + fail) units; skips are excluded.
    pub fn pass_ratio(&self) -> Option<f64> {
        let tally = self.tally();
        let executed = tally.pass + tally.fail;
        if executed == 0 {
            None
        } else {
            Some(tally.pass as f64 / executed as f64)
        }
    }

    pub fn has_failures(&self) -> bool {
        self.tally().fail > 0
    }
}
