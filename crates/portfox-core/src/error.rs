use std::io;
use std::path::PathBuf;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the lifecycle subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("network request failed: {message}")]
    Network {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("request to {url} timed out after {after_secs}s")]
    Timeout { url: String, after_secs: u64 },

    #[error("no published Firefox version for channel '{channel}'")]
    NotFound { channel: String },

    #[error(
        "download integrity check failed: SHA-512 mismatch (expected {expected}, got {actual}); the file may be corrupted or tampered with"
    )]
    Integrity { expected: String, actual: String },

    #[error("operation cancelled by user")]
    Cancelled,

    #[error("extraction failed: {message}")]
    Extraction {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("{} is not a portable Firefox installation: {reason}", root.display())]
    NotAPortableInstallation { root: PathBuf, reason: String },

    #[error("Firefox directory not found in portable installation {}", root.display())]
    FirefoxDirectoryNotFound { root: PathBuf },

    #[error("could not determine the Firefox version from {}", path.display())]
    VersionUndeterminable { path: PathBuf },

    #[error("invalid Firefox version format: {0:?}")]
    InvalidVersion(String),

    #[error("Firefox is currently running; close it and retry")]
    ApplicationRunning,

    #[error(
        "failed to move current Firefox directory {}: {source}; make sure Firefox is not running",
        path.display()
    )]
    LiveDirectoryLocked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "failed to place new Firefox files at {}: {source}; the previous installation was restored",
        live.display()
    )]
    SwapFailed {
        live: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "critical: update failed and rollback failed; original files are preserved at {} (swap error: {swap_error}; rollback error: {rollback_error})",
        backup.display()
    )]
    CriticalRollbackFailed {
        backup: PathBuf,
        swap_error: io::Error,
        rollback_error: io::Error,
    },

    #[error("failed to build portable structure: {message}")]
    Structure {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid destination: {0}")]
    Destination(String),

    #[error("a {kind} operation is already running for {}", target.display())]
    Busy { kind: String, target: PathBuf },

    #[error("{kind} worker for {} stopped unexpectedly", target.display())]
    WorkerPanicked { kind: String, target: PathBuf },

    #[error("{message}")]
    Filesystem {
        message: String,
        #[source]
        source: BoxError,
    },
}

impl LifecycleError {
    pub fn network(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn extraction(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Extraction {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn structure(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Structure {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn filesystem(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Filesystem {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Transient failures where retrying the whole flow is reasonable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Failures that leave the installation needing manual repair.
    pub fn requires_manual_recovery(&self) -> bool {
        matches!(self, Self::CriticalRollbackFailed { .. })
    }
}
