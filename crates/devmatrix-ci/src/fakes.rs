//! In-memory queue and executor fakes (testing only)

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CiError, Result};
use crate::executor::JobExecutor;
use crate::job::{Job, JobReport, ReportStatus};
use crate::queue::JobQueue;

// ---------------------------------------------------------------------------
// ScriptedQueue
// ---------------------------------------------------------------------------

/// One scripted poll response.
#[derive(Debug, Clone)]
pub enum Offer {
    Job(Job),
    Nothing,
    TransportError(String),
}

/// Queue that replays scripted offers and records every request.
///
/// Polls past the end of the script return no job. Accepts succeed unless a
/// refusal was scripted for the job id.
#[derive(Debug, Default)]
pub struct ScriptedQueue {
    offers: Mutex<VecDeque<Offer>>,
    refused: Mutex<Vec<u64>>,
    polls: Mutex<Vec<(Vec<u64>, Vec<String>)>>,
    accepts: Mutex<Vec<u64>>,
    reports: Mutex<Vec<JobReport>>,
    failing_reports: Mutex<bool>,
}

impl ScriptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, job: Job) {
        self.offers.lock().unwrap().push_back(Offer::Job(job));
    }

    pub fn offer_nothing(&self) {
        self.offers.lock().unwrap().push_back(Offer::Nothing);
    }

    pub fn offer_error(&self, detail: &str) {
        self.offers
            .lock()
            .unwrap()
            .push_back(Offer::TransportError(detail.to_string()));
    }

    pub fn refuse(&self, id: u64) {
        self.refused.lock().unwrap().push(id);
    }

    /// Every report request fails with a transport error.
    pub fn fail_reports(&self) {
        *self.failing_reports.lock().unwrap() = true;
    }

    /// `(completed ids, statuses)` of every poll, in order.
    pub fn polls(&self) -> Vec<(Vec<u64>, Vec<String>)> {
        self.polls.lock().unwrap().clone()
    }

    pub fn accepts(&self) -> Vec<u64> {
        self.accepts.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<JobReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for ScriptedQueue {
    async fn next_job(&self, completed: &[u64], statuses: &[String]) -> Result<Option<Job>> {
        self.polls
            .lock()
            .unwrap()
            .push((completed.to_vec(), statuses.to_vec()));
        match self.offers.lock().unwrap().pop_front() {
            Some(Offer::Job(job)) => Ok(Some(job)),
            Some(Offer::TransportError(detail)) => Err(CiError::Transport(detail)),
            Some(Offer::Nothing) | None => Ok(None),
        }
    }

    async fn accept(&self, job: &Job, _statuses: &[String]) -> Result<bool> {
        self.accepts.lock().unwrap().push(job.id);
        Ok(!self.refused.lock().unwrap().contains(&job.id))
    }

    async fn report(&self, report: &JobReport) -> Result<()> {
        if *self.failing_reports.lock().unwrap() {
            return Err(CiError::Transport("connection reset".to_string()));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticExecutor
// ---------------------------------------------------------------------------

/// Executor that reports a fixed status for every job and records job ids.
#[derive(Debug)]
pub struct StaticExecutor {
    status: ReportStatus,
    output: String,
    executed: Mutex<Vec<u64>>,
}

impl StaticExecutor {
    pub fn new(status: ReportStatus, output: &str) -> Self {
        Self {
            status,
            output: output.to_string(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn passing() -> Self {
        Self::new(ReportStatus::Pass, "0 failures")
    }

    pub fn executed(&self) -> Vec<u64> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for StaticExecutor {
    async fn execute(&self, job: &Job) -> Result<JobReport> {
        self.executed.lock().unwrap().push(job.id);
        Ok(JobReport {
            job_id: job.id,
            status: self.status,
            output: self.output.clone(),
            duration: Some(1.0),
            revision: job.revision.clone(),
        })
    }
}
