//! devmatrix-ci: CI worker client
//!
//! Lets a worker machine pull single matrix cells from a coordination
//! server, run them through the devmatrix engine and report back:
//! - `JobQueue` / `HttpJobQueue`: poll, accept and report over JSON/HTTP
//! - `EngineExecutor`: runs `sync` then `spec` for one job's cell
//! - `CiClient`: the sequential poll -> accept -> execute -> report loop

pub mod client;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod job;
pub mod queue;

pub use client::{CiClient, ClientConfig, ClientState, ClientSummary};
pub use error::{CiError, Result};
pub use executor::{EngineExecutor, JobExecutor};
pub use job::{Credentials, Job, JobReport, ReportStatus};
pub use queue::{parse_job, HttpJobQueue, JobQueue};
