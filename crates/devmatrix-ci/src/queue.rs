//! Remote job queue: the poll / accept / report requests.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{CiError, Result};
use crate::job::{Credentials, Job, JobReport};

/// Coordination server seen by the client.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Next offered job, excluding ids already completed by this process.
    async fn next_job(&self, completed: &[u64], statuses: &[String]) -> Result<Option<Job>>;

    /// Claim a job. `false` means another worker owns it.
    async fn accept(&self, job: &Job, statuses: &[String]) -> Result<bool>;

    async fn report(&self, report: &JobReport) -> Result<()>;
}

/// JSON-over-HTTP queue rooted at a service base URL.
#[derive(Debug, Clone)]
pub struct HttpJobQueue {
    base: Url,
    client: reqwest::Client,
    credentials: Credentials,
}

#[derive(Serialize)]
struct AcceptRequest<'a> {
    id: u64,
    status: String,
    credentials: &'a Credentials,
}

#[derive(Deserialize)]
struct AcceptResponse {
    #[serde(default)]
    accepted: bool,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    credentials: &'a Credentials,
    report: &'a JobReport,
}

impl HttpJobQueue {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        Self::with_client(base_url, credentials, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, credentials: Credentials, client: reqwest::Client) -> Result<Self> {
        // Relative joins replace the last segment unless the base ends in '/'.
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized).map_err(|e| CiError::InvalidUrl {
            url: base_url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            base,
            client,
            credentials,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| CiError::InvalidUrl {
            url: format!("{}{path}", self.base),
            detail: e.to_string(),
        })
    }

    /// `next-job?previous_jobs=<ids>[&status=<statuses>]`
    pub fn next_job_url(&self, completed: &[u64], statuses: &[String]) -> Result<Url> {
        let mut url = self.endpoint("next-job")?;
        {
            let ids: Vec<String> = completed.iter().map(u64::to_string).collect();
            let mut query = url.query_pairs_mut();
            query.append_pair("previous_jobs", &ids.join(","));
            if !statuses.is_empty() {
                query.append_pair("status", &statuses.join(","));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn next_job(&self, completed: &[u64], statuses: &[String]) -> Result<Option<Job>> {
        let url = self.next_job_url(completed, statuses)?;
        tracing::debug!(%url, "polling for job");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_job(&body)
    }

    async fn accept(&self, job: &Job, statuses: &[String]) -> Result<bool> {
        let url = self.endpoint("jobs/accept")?;
        let request = AcceptRequest {
            id: job.id,
            status: statuses.join(","),
            credentials: &self.credentials,
        };
        let body = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let response: AcceptResponse = serde_json::from_str(&body).map_err(|e| CiError::Protocol {
            endpoint: "jobs/accept".to_string(),
            detail: e.to_string(),
        })?;
        Ok(response.accepted)
    }

    async fn report(&self, report: &JobReport) -> Result<()> {
        let url = self.endpoint("jobs/report")?;
        let request = ReportRequest {
            credentials: &self.credentials,
            report,
        };
        self.client
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Decode a poll response. An empty body, `null`, `{}` or `[]` means no
/// job; a non-empty array offers its first element.
pub fn parse_job(body: &str) -> Result<Option<Job>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let value = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(ref map) if map.is_empty() => return Ok(None),
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return Ok(None),
        },
        other => other,
    };
    let job = serde_json::from_value(value).map_err(|e| CiError::Protocol {
        endpoint: "next-job".to_string(),
        detail: e.to_string(),
    })?;
    Ok(Some(job))
}
