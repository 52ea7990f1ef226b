//! Error types for the Python skill runtime.

/// Errors that can occur during Python skill operations.
#[derive(Debug, thiserror::Error)]
pub enum PythonSkillError {
    /// Failed to spawn the Python subprocess.
    #[error("failed to spawn skill process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Operation timed out.
    #[error("skill operation timed out after {timeout_secs}s")]
    Timeout {
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    /// JSON-RPC protocol violation.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the protocol violation.
        message: String,
    },

    /// Skill handshake failed.
    #[error("handshake failed: {reason}")]
    HandshakeFailed {
        /// Why the handshake failed.
        reason: String,
    },

    /// Skill process exited unexpectedly.
    #[error("skill process exited unexpectedly (exit code: {exit_code:?})")]
    ProcessExited {
        /// The exit code, if available.
        exit_code: Option<i32>,
    },

    /// Output exceeded maximum allowed size.
    #[error("skill output exceeded {max_bytes} bytes")]
    OutputTruncated {
        /// The maximum allowed output size.
        max_bytes: usize,
    },

    /// Named skill was not found.
    #[error("skill not found: {name}")]
    SkillNotFound {
        /// The skill name that was looked up.
        name: String,
    },

    /// Exceeded maximum restart attempts.
    #[error("skill exceeded maximum restarts ({count})")]
    MaxRestartsExceeded {
        /// How many restarts were attempted.
        count: u32,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

impl From<serde_json::Error> for PythonSkillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}
