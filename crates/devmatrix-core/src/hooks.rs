//! Lifecycle hooks run around a whole operation.
//!
//! Hooks are plain values handed to [`crate::Project`] by its caller; there
//! is no global registry.

use std::fmt;
use std::sync::Arc;

use crate::command::OperationKind;
use crate::environment::Environment;
use crate::error::{MatrixError, Result};
use crate::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

type HookFn = dyn Fn(&Environment, &[Repository]) -> Result<()> + Send + Sync;

#[derive(Clone)]
pub struct LifecycleHook {
    pub name: String,
    pub phase: Phase,
    pub operation: OperationKind,
    callback: Arc<HookFn>,
}

impl LifecycleHook {
    pub fn before<F>(name: impl Into<String>, operation: OperationKind, callback: F) -> Self
    where
        F: Fn(&Environment, &[Repository]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            phase: Phase::Before,
            operation,
            callback: Arc::new(callback),
        }
    }

    pub fn after<F>(name: impl Into<String>, operation: OperationKind, callback: F) -> Self
    where
        F: Fn(&Environment, &[Repository]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            phase: Phase::After,
            operation,
            callback: Arc::new(callback),
        }
    }

    pub fn applies(&self, phase: Phase, operation: OperationKind) -> bool {
        self.phase == phase && self.operation == operation
    }

    pub fn call(&self, env: &Environment, repos: &[Repository]) -> Result<()> {
        (self.callback)(env, repos).map_err(|e| MatrixError::Hook {
            hook: self.name.clone(),
            detail: e.to_string(),
        })
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Run matching hooks in registration order. A failing hook is logged and
/// does not stop the operation.
pub fn run_hooks(
    hooks: &[LifecycleHook],
    phase: Phase,
    operation: OperationKind,
    env: &Environment,
    repos: &[Repository],
) -> usize {
    let mut ran = 0;
    for hook in hooks.iter().filter(|h| h.applies(phase, operation)) {
        tracing::debug!(hook = %hook.name, ?phase, operation = operation.name(), "running hook");
        if let Err(e) = hook.call(env, repos) {
            tracing::warn!(error = %e, "lifecycle hook failed");
        }
        ran += 1;
    }
    ran
}
