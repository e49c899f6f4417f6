//! Error types for the Pollard research pipeline.
//!
//! Uses `thiserror` for public API error types. Stage functions never return
//! these for item-local problems; they are converted into per-item failure
//! records instead. The typed errors surface from single-item operations
//! (`Fetcher::fetch_one`, `Synthesizer::synthesize_one`) and configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the Pollard core library.
#[derive(Debug, thiserror::Error)]
pub enum PollardError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search error: {message}")]
    Search { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from content retrieval for a single item.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not determine owner/repo")]
    MissingRepository,

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("status {status}")]
    Status { status: u16 },

    #[error("invalid response body: {message}")]
    Body { message: String },

    #[error("failed to decode README: {message}")]
    Decode { message: String },

    #[error("HTTP client construction failed: {message}")]
    Client { message: String },

    #[error("fetch cancelled")]
    Cancelled,
}

/// Errors from invoking the external reasoning agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("empty agent command")]
    EmptyCommand,

    #[error("failed to spawn agent '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("agent timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("agent cancelled")]
    Cancelled,

    #[error("agent failed (exit code {code:?}): {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
}

/// Errors from synthesizing a single item.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("failed to parse agent JSON: {message}")]
    Parse { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl FetchError {
    pub(crate) fn request(err: impl std::fmt::Display) -> Self {
        FetchError::Request {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `PollardError`.
pub type Result<T> = std::result::Result<T, PollardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_fetch() {
        let err = PollardError::Fetch(FetchError::Status { status: 404 });
        assert_eq!(err.to_string(), "Fetch error: status 404");
    }

    #[test]
    fn test_error_display_missing_repository() {
        assert_eq!(
            FetchError::MissingRepository.to_string(),
            "could not determine owner/repo"
        );
    }

    #[test]
    fn test_error_display_agent_timeout() {
        let err = SynthesisError::from(AgentError::Timeout {
            timeout: Duration::from_secs(120),
        });
        assert_eq!(err.to_string(), "agent timed out after 120s");
    }

    #[test]
    fn test_error_display_config() {
        let err = PollardError::Config(ConfigError::Invalid {
            message: "parallelism must be at least 1".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: parallelism must be at least 1"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PollardError = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
