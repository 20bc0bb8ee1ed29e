//! Error taxonomy for the devmatrix engine.
//!
//! Only configuration problems are fatal to a run. Shell failures, policy
//! skips and not-executable repositories are recorded as results instead of
//! surfacing here.

/// Errors produced by the devmatrix engine.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// The repository registry could not be read or fetched.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The registry could not be written back.
    #[error("registry error: {0}")]
    Registry(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown project family: {0}")]
    UnknownFamily(String),

    /// The subprocess could not be started at all.
    #[error("shell error: {0}")]
    Shell(String),

    /// Dependencies of one interpreter version could not be installed.
    #[error("bundle install failed for {repo} on {ruby}: {detail}")]
    Install {
        repo: String,
        ruby: String,
        detail: String,
    },

    #[error("package specification error for {repo}: {detail}")]
    PackageSpec { repo: String, detail: String },

    #[error("lifecycle hook '{hook}' failed: {detail}")]
    Hook { hook: String, detail: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for MatrixError {
    fn from(err: reqwest::Error) -> Self {
        MatrixError::Http(err.to_string())
    }
}

/// Result type for devmatrix engine operations.
pub type Result<T> = std::result::Result<T, MatrixError>;
