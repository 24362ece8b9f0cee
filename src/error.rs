//! Error types for the orchestrator
//!
//! The taxonomy mirrors the failure policy of the install and cleanup
//! executors: strategy determination failures abort before any mutation,
//! a failed package install aborts the whole install, and readiness
//! timeouts must stay distinguishable from external cancellation.

use std::time::Duration;

use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error, tagged with the operation that issued the call
    #[error("kubernetes error during {operation}: {source}")]
    Kube {
        /// The operation that was talking to the API server
        operation: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Helm invocation failed
    #[error("helm {operation} failed: {message}")]
    Helm {
        /// The helm subcommand that failed (install, upgrade, uninstall, list)
        operation: String,
        /// Stderr or parse failure description
        message: String,
    },

    /// Object storage backend error
    #[error("object storage error during {operation}: {message}")]
    Storage {
        /// The storage operation that failed
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Health snapshot could not be computed; the install was aborted
    /// before any cluster mutation
    #[error("could not determine install strategy: {source}")]
    Strategy {
        /// The underlying failure from the status inspector
        #[source]
        source: Box<Error>,
    },

    /// The package install/upgrade step failed; the subsystem cannot
    /// function without it so the install is aborted
    #[error("fatal install step '{step}' failed: {source}")]
    FatalInstallStep {
        /// Name of the failed step
        step: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A cleanup step failed (fatal only for the release uninstall in
    /// non-force mode)
    #[error("cleanup step '{step}' failed: {source}")]
    CleanupStep {
        /// Name of the failed step
        step: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// All retry attempts for an operation were exhausted
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the retried operation
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// The last failure
        #[source]
        source: Box<Error>,
    },

    /// The readiness ceiling elapsed before the condition held
    #[error("timed out after {elapsed:?} waiting for {condition}")]
    ReadinessTimeout {
        /// The condition being polled
        condition: String,
        /// How long we waited
        elapsed: Duration,
    },

    /// The caller cancelled the operation
    #[error("{operation} cancelled")]
    Cancelled {
        /// The operation that was in flight
        operation: String,
    },

    /// Request validation error
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a Kubernetes error tagged with an operation name
    pub fn kube(operation: impl Into<String>, source: kube::Error) -> Self {
        Self::Kube {
            operation: operation.into(),
            source,
        }
    }

    /// Create a Helm error
    pub fn helm(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Helm {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an object storage error
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Wrap a status inspection failure as a strategy determination error
    pub fn strategy(source: Error) -> Self {
        Self::Strategy {
            source: Box::new(source),
        }
    }

    /// Wrap a failure of the package install/upgrade step
    pub fn fatal_install_step(step: impl Into<String>, source: Error) -> Self {
        Self::FatalInstallStep {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a cleanup step failure
    pub fn cleanup_step(step: impl Into<String>, source: Error) -> Self {
        Self::CleanupStep {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Wrap the last failure after exhausting retries
    pub fn retries_exhausted(operation: impl Into<String>, attempts: u32, source: Error) -> Self {
        Self::RetriesExhausted {
            operation: operation.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Create a readiness timeout error
    pub fn readiness_timeout(condition: impl Into<String>, elapsed: Duration) -> Self {
        Self::ReadinessTimeout {
            condition: condition.into(),
            elapsed,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True if this error (or the failure it wraps) is a cancellation
    ///
    /// Cancellation propagates immediately through retries and executors,
    /// so wrapping layers must keep it recognizable.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::Strategy { source }
            | Error::FatalInstallStep { source, .. }
            | Error::CleanupStep { source, .. }
            | Error::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True if this is a readiness timeout (non-fatal during install)
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self, Error::ReadinessTimeout { .. })
    }
}
