//! Error types for the verification harness

use thiserror::Error;

/// Failures of a live query against the cloud provider
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Azure API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl QueryError {
    /// Whether the failure came from the network rather than the API
    pub fn is_transient(&self) -> bool {
        match self {
            QueryError::Transport(_) => true,
            QueryError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Deprovisioning failed: {0}")]
    Destroy(String),

    #[error("Cloud query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Terraform output not found: {0}")]
    MissingOutput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Terraform error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
