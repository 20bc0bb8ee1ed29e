//! CI client state machine.
//!
//! ```text
//! Idle -> Polling -> (no job)   -> Terminated | Sleeping -> Polling
//!                 -> (offered)  -> Accepting -> (rejected) -> Polling
//!                                            -> (accepted) -> Executing -> Reporting -> Idle
//! ```
//!
//! Exactly one job is in flight at a time.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::executor::JobExecutor;
use crate::job::{Job, JobReport};
use crate::queue::JobQueue;

const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sleep between polls that found no job.
    pub poll_period: Duration,
    /// Terminate on the first empty poll instead of sleeping.
    pub stop_when_done: bool,
    /// Previous-status filter passed to the server.
    pub statuses: Vec<String>,
    /// Terminate after this many executed jobs.
    pub max_jobs: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            stop_when_done: false,
            statuses: Vec::new(),
            max_jobs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Idle,
    Polling,
    Sleeping,
    Accepting(Job),
    Executing(Job),
    Reporting(JobReport),
    Terminated,
}

impl ClientState {
    pub fn name(&self) -> &'static str {
        match self {
            ClientState::Idle => "idle",
            ClientState::Polling => "polling",
            ClientState::Sleeping => "sleeping",
            ClientState::Accepting(_) => "accepting",
            ClientState::Executing(_) => "executing",
            ClientState::Reporting(_) => "reporting",
            ClientState::Terminated => "terminated",
        }
    }
}

/// Counters of one client lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub polls: usize,
    pub executed: usize,
    pub rejected: usize,
    /// Reported or rejected job ids, in completion order.
    pub completed: Vec<u64>,
}

pub struct CiClient {
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    config: ClientConfig,
    state: ClientState,
    summary: ClientSummary,
}

impl CiClient {
    pub fn new(queue: Arc<dyn JobQueue>, executor: Arc<dyn JobExecutor>, config: ClientConfig) -> Self {
        Self {
            queue,
            executor,
            config,
            state: ClientState::Idle,
            summary: ClientSummary::default(),
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn summary(&self) -> &ClientSummary {
        &self.summary
    }

    /// Drive the machine until it terminates.
    pub async fn run(&mut self) -> ClientSummary {
        while self.state != ClientState::Terminated {
            self.step().await;
        }
        tracing::info!(
            polls = self.summary.polls,
            executed = self.summary.executed,
            rejected = self.summary.rejected,
            "ci client terminated"
        );
        self.summary.clone()
    }

    /// Perform one transition and return the new state.
    pub async fn step(&mut self) -> &ClientState {
        let current = std::mem::replace(&mut self.state, ClientState::Terminated);
        self.state = match current {
            ClientState::Idle => self.leave_idle(),
            ClientState::Polling => self.poll().await,
            ClientState::Sleeping => {
                tokio::time::sleep(self.config.poll_period).await;
                ClientState::Polling
            }
            ClientState::Accepting(job) => self.accept(job).await,
            ClientState::Executing(job) => self.execute(job).await,
            ClientState::Reporting(report) => self.report(report).await,
            ClientState::Terminated => ClientState::Terminated,
        };
        tracing::debug!(state = self.state.name(), "ci client transition");
        &self.state
    }

    fn leave_idle(&self) -> ClientState {
        match self.config.max_jobs {
            Some(max) if self.summary.executed >= max => ClientState::Terminated,
            _ => ClientState::Polling,
        }
    }

    fn no_job(&self) -> ClientState {
        if self.config.stop_when_done {
            ClientState::Terminated
        } else {
            ClientState::Sleeping
        }
    }

    async fn poll(&mut self) -> ClientState {
        self.summary.polls += 1;
        match self
            .queue
            .next_job(&self.summary.completed, &self.config.statuses)
            .await
        {
            Ok(Some(job)) => {
                tracing::info!(job = job.id, library = %job.library, "job offered");
                ClientState::Accepting(job)
            }
            Ok(None) => {
                tracing::debug!("no job available");
                self.no_job()
            }
            Err(e) => {
                tracing::warn!(error = %e, "polling failed");
                self.no_job()
            }
        }
    }

    async fn accept(&mut self, job: Job) -> ClientState {
        match self.queue.accept(&job, &self.config.statuses).await {
            Ok(true) => ClientState::Executing(job),
            Ok(false) => {
                tracing::info!(job = job.id, "job claimed by another worker");
                self.summary.rejected += 1;
                self.summary.completed.push(job.id);
                ClientState::Polling
            }
            Err(e) => {
                tracing::warn!(job = job.id, error = %e, "accept failed");
                ClientState::Polling
            }
        }
    }

    async fn execute(&mut self, job: Job) -> ClientState {
        let report = match self.executor.execute(&job).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(job = job.id, error = %e, "job execution failed");
                JobReport::failed(&job, e.to_string())
            }
        };
        self.summary.executed += 1;
        ClientState::Reporting(report)
    }

    async fn report(&mut self, report: JobReport) -> ClientState {
        if let Err(e) = self.queue.report(&report).await {
            tracing::warn!(job = report.job_id, error = %e, "report failed");
        } else {
            tracing::info!(job = report.job_id, status = ?report.status, "job reported");
        }
        self.summary.completed.push(report.job_id);
        ClientState::Idle
    }
}
