//! Error types for the CI worker client

use devmatrix_core::MatrixError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiError {
    #[error("CI login is missing. Set DEVMATRIX_CI_LOGIN or use --login")]
    LoginMissing,

    #[error("CI token is missing. Set DEVMATRIX_CI_TOKEN or use --token")]
    TokenMissing,

    #[error("Invalid service URL {url}: {detail}")]
    InvalidUrl { url: String, detail: String },

    /// The request never produced a usable HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },

    #[error("Engine error: {0}")]
    Engine(#[from] MatrixError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        CiError::Transport(err.to_string())
    }
}

/// Result type for CI client operations
pub type Result<T> = std::result::Result<T, CiError>;
