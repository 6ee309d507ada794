//! Error types for the benchmark harness.
//!
//! Three families of failure exist and they are treated very differently:
//!
//! - [`Error`] covers everything that aborts a campaign before any network or
//!   remote activity happens (bad configuration, unreadable files, YAML).
//! - [`TransportError`] is raised by broker sessions. Workers log and count it;
//!   a lost publish only shows up later as an unanswered request.
//! - [`RemoteError`] is raised by remote-shell sessions. A task runner treats it
//!   as one failed iteration and carries on.

use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for broker operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Result type alias for remote-shell operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Main error type for harness operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A payload or document could not be (de)serialized.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Broker failure that had to be surfaced to the caller.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

// ==============================================================================
// Broker Errors
// ==============================================================================

/// Failures of a publish/subscribe session.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Failed to connect to broker {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Failed to subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to publish to '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    #[error("Broker session closed")]
    Disconnected,
}

impl TransportError {
    pub fn connect(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn subscribe(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn publish(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

// ==============================================================================
// Remote Execution Errors
// ==============================================================================

/// Failures of a single remote-shell command execution.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("Failed to open remote session to {user}@{host}: {reason}")]
    Spawn {
        host: String,
        user: String,
        reason: String,
    },

    #[error("Remote command failed on {host} (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        host: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Remote command timed out on {host} after {seconds}s")]
    Timeout { host: String, seconds: u64 },
}

impl RemoteError {
    pub fn spawn(host: impl Into<String>, user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            host: host.into(),
            user: user.into(),
            reason: reason.into(),
        }
    }

    pub fn command_failed(
        host: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            host: host.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Host the failed command was aimed at.
    pub fn host(&self) -> &str {
        match self {
            RemoteError::Spawn { host, .. }
            | RemoteError::CommandFailed { host, .. }
            | RemoteError::Timeout { host, .. } => host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_message() {
        let err = Error::config("rounds must be greater than 0").context("Failed to load bench.yaml");
        assert_eq!(
            err.to_string(),
            "Failed to load bench.yaml: Configuration error: rounds must be greater than 0"
        );
    }

    #[test]
    fn test_transport_error_converts() {
        let err: Error = TransportError::subscribe("fast/migfra/+/result", "not authorized").into();
        assert!(matches!(err, Error::Transport(TransportError::Subscribe { .. })));
        assert_eq!(
            err.to_string(),
            "Transport error: Failed to subscribe to 'fast/migfra/+/result': not authorized"
        );
    }

    #[test]
    fn test_remote_error_reports_host() {
        let err = RemoteError::spawn("vm2", "root", "connection refused");
        assert_eq!(err.host(), "vm2");
        assert!(err.to_string().contains("root@vm2"));
    }

    #[test]
    fn test_result_ext_context() {
        let res: Result<()> = Err(Error::config("bad"));
        let err = res.context("outer").unwrap_err();
        assert!(matches!(err, Error::WithContext { .. }));
    }
}
