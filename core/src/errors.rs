/// Error types for the Spinoza session orchestration layer.
use serde_json::Value;
use thiserror::Error;

/// Fatal configuration errors, raised only while constructing a manager.
///
/// Everything downstream of construction is bulkhead-isolated: per-session
/// faults are recorded in summaries and reports, never raised as errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Descriptor set is empty")]
    EmptyDescriptorSet,

    #[error("Duplicate session id: {0}")]
    DuplicateSessionId(String),

    #[error("Session id must not be empty")]
    EmptySessionId,

    #[error("Session '{0}' has no command")]
    EmptyCommand(String),
}

/// Per-session errors during startup and protocol exchange.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to spawn provider process: {0}")]
    SpawnFailed(String),

    #[error("Provider did not complete the handshake within {0:?}")]
    StartupTimeout(std::time::Duration),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session is not ready (state: {0})")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to callers of `invoke`.
#[derive(Error, Debug)]
pub enum InvocationError {
    /// Caller asked for a name no Ready session ever listed. No child
    /// process is contacted on this path.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport failure: {0}")]
    Transport(String),

    /// Well-formed error payload from the provider, passed through verbatim.
    #[error("Provider returned an error: {0}")]
    Child(Value),
}

/// Result type for session lifecycle operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for tool invocations.
pub type InvocationResult<T> = Result<T, InvocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_error_preserves_payload() {
        let payload = serde_json::json!({"code": -32000, "message": "boom"});
        let err = InvocationError::Child(payload.clone());
        match err {
            InvocationError::Child(v) => assert_eq!(v, payload),
            _ => panic!("wrong variant"),
        }
    }
}
