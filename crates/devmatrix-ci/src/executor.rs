//! Executes one accepted job as a single-cell permutation of the engine.

use std::sync::Arc;

use async_trait::async_trait;

use devmatrix_core::{
    EnvOptions, Environment, Family, GitProbe, OperationKind, Project, Registry, Shell, Status,
    SystemShell, WorkspaceProbe,
};

use crate::error::Result;
use crate::job::{Job, JobReport};

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<JobReport>;
}

/// Runs `sync` then `spec` for exactly the job's library, interpreter
/// version and adapter, with output capture on.
pub struct EngineExecutor {
    family: Family,
    base: EnvOptions,
    shell: Arc<dyn Shell>,
    probe: Arc<dyn WorkspaceProbe>,
}

impl EngineExecutor {
    /// `base` carries worker-wide settings (root, registry, gemset, ...);
    /// the job's coordinates override it.
    pub fn new(family: Family, base: EnvOptions) -> Self {
        Self {
            family,
            base,
            shell: Arc::new(SystemShell),
            probe: Arc::new(GitProbe),
        }
    }

    pub fn with_shell(mut self, shell: Arc<dyn Shell>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn WorkspaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Options restricted to the job's cell.
    pub fn permutation(&self, job: &Job) -> EnvOptions {
        EnvOptions {
            include: Some(vec![job.library.clone()]),
            rubies: Some(vec![job.platform.clone()]),
            adapters: Some(vec![job.adapter.clone()]),
            revision: job.revision.clone(),
            capture_output: Some(true),
            ..self.base.clone()
        }
    }

    fn project(&self, job: &Job) -> Result<Project> {
        let env = Environment::from_process(&self.family, &self.permutation(job))?;
        let registry = Registry::load(&env.registry_path)?;
        let cwd = env.root.clone();
        Ok(Project::from_registry(env, self.family.clone(), &registry, &cwd)
            .with_shell(self.shell.clone())
            .with_probe(self.probe.clone()))
    }
}

#[async_trait]
impl JobExecutor for EngineExecutor {
    async fn execute(&self, job: &Job) -> Result<JobReport> {
        tracing::info!(
            job = job.id,
            library = %job.library,
            platform = %job.platform,
            adapter = %job.adapter,
            "executing job"
        );
        let mut project = self.project(job)?;

        // A failed sync leaves the checkout at an unknown revision.
        let sync = project.run(OperationKind::Sync).await;
        let failed_sync = sync
            .get(&job.library)
            .and_then(|repo| repo.primary())
            .filter(|cell| cell.result.status == Status::Fail);
        if let Some(cell) = failed_sync {
            tracing::warn!(job = job.id, library = %job.library, "sync failed");
            return Ok(JobReport::from_cell(job, cell));
        }

        let spec = project.run(OperationKind::Spec).await;
        Ok(JobReport::from_results(job, &spec))
    }
}
