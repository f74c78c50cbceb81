use std::process::ExitCode;

use thiserror::Error;

use crate::config::ConfigError;
use crate::github::GitHubError;

/// Top-level failure classes of a collector run.
/// Each maps to its own process exit status.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GitHub client error: {0}")]
    GitHub(#[from] GitHubError),

    #[error("GitHub token rejected: {0}")]
    Unauthorized(String),

    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Collection aborted: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CollectorError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CollectorError::Internal(_) | CollectorError::GitHub(_) => ExitCode::from(1),
            CollectorError::Config(_) => ExitCode::from(2),
            CollectorError::Unauthorized(_) => ExitCode::from(3),
            CollectorError::Connection(_) => ExitCode::from(4),
        }
    }
}
