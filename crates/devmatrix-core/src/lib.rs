//! devmatrix-core: command engine and matrix runner
//!
//! Runs build/test/release operations across a family of repositories,
//! repeating each over the interpreter-version x adapter matrix and
//! collecting pass/fail/skip results.
//!
//! ## Key Components
//!
//! - `Environment`: layered configuration snapshot (option > variable > default)
//! - `RepositorySet`: which registered repositories take part in a run
//! - `Command` / `DispatchTable`: one operation bound to one repository
//! - `Project`: runs an operation over the selection with lifecycle hooks
//! - `RunResults`: per-repository, per-cell outcomes

pub mod command;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod family;
pub mod hooks;
pub mod logger;
pub mod matrix;
pub mod probe;
pub mod project;
pub mod registry;
pub mod repository;
pub mod result;
pub mod shell;
pub mod telemetry;

pub use command::sync::SyncVariant;
pub use command::{Axes, Command, Constructor, DispatchTable, OperationKind, RunContext};
pub use environment::{EnvOptions, Environment, Flags};
pub use error::{MatrixError, Result};
pub use family::{Family, FamilyKind};
pub use hooks::{LifecycleHook, Phase};
pub use logger::Logger;
pub use matrix::applicable_adapters;
pub use probe::{GitProbe, WorkspaceProbe};
pub use project::Project;
pub use registry::{Registry, RegistryEntry};
pub use repository::{Repository, RepositorySet};
pub use result::{Cell, CellResult, CommandResult, RepositoryResults, RunResults, SkipReason, Status, Tally};
pub use shell::{Invocation, OutputMode, Shell, ShellOutcome, SystemShell};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
