//! Job and report wire types.

use serde::{Deserialize, Serialize};

use devmatrix_core::{CellResult, RunResults, Status};

use crate::error::{CiError, Result};

pub const LOGIN_VAR: &str = "DEVMATRIX_CI_LOGIN";
pub const TOKEN_VAR: &str = "DEVMATRIX_CI_TOKEN";

/// Output reported when the run produced nothing for the job's library.
pub const SKIPPED_OUTPUT: &str = "skipped";

/// One offered matrix cell: a library at a revision, on one interpreter
/// version with one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    /// Interpreter version.
    #[serde(rename = "platform_name")]
    pub platform: String,
    #[serde(rename = "adapter_name")]
    pub adapter: String,
    /// Repository name.
    #[serde(rename = "library_name")]
    pub library: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub previous_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pass,
    Fail,
    Skipped,
}

impl From<Status> for ReportStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Pass => ReportStatus::Pass,
            Status::Fail => ReportStatus::Fail,
            Status::Skip => ReportStatus::Skipped,
        }
    }
}

/// Outcome of one executed job, as submitted to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: u64,
    pub status: ReportStatus,
    pub output: String,
    /// Seconds. Absent when nothing was executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub revision: Option<String>,
}

impl JobReport {
    /// Report the job's cell from a run's results.
    ///
    /// Falls back to `skipped` with output `"skipped"` and no duration when
    /// the run holds no result for the library.
    pub fn from_results(job: &Job, results: &RunResults) -> Self {
        let cell = results.get(&job.library).and_then(|repo| {
            repo.cells
                .iter()
                .find(|c| matches_job(c, job))
                .or_else(|| repo.primary())
        });
        match cell {
            Some(cell) => Self::from_cell(job, cell),
            None => Self::skipped(job),
        }
    }

    pub fn from_cell(job: &Job, cell: &CellResult) -> Self {
        Self {
            job_id: job.id,
            status: cell.result.status.into(),
            output: cell.result.output.clone().unwrap_or_default(),
            duration: cell.result.duration_ms.map(|ms| ms as f64 / 1000.0),
            revision: job.revision.clone(),
        }
    }

    pub fn skipped(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: ReportStatus::Skipped,
            output: SKIPPED_OUTPUT.to_string(),
            duration: None,
            revision: job.revision.clone(),
        }
    }

    /// The job could not be executed at all.
    pub fn failed(job: &Job, detail: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            status: ReportStatus::Fail,
            output: detail.into(),
            duration: None,
            revision: job.revision.clone(),
        }
    }
}

fn matches_job(cell: &CellResult, job: &Job) -> bool {
    cell.cell.ruby.as_deref() == Some(job.platform.as_str())
        && cell.cell.adapter.as_deref() == Some(job.adapter.as_str())
}

/// Worker identity sent with accept and report requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub token: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            token: token.into(),
        }
    }

    /// Read `DEVMATRIX_CI_LOGIN` / `DEVMATRIX_CI_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let login = present(LOGIN_VAR).ok_or(CiError::LoginMissing)?;
        let token = present(TOKEN_VAR).ok_or(CiError::TokenMissing)?;
        Ok(Self { login, token })
    }
}
