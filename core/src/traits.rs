/// Core trait definitions for the Spinoza orchestration layer.
use crate::errors::{InvocationResult, SessionResult};
use crate::protocol::ToolDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Lifecycle state of a tool-provider session.
///
/// Transitions: `Uninitialized → Initializing → {Ready | Failed}`, and from
/// any non-terminal state `→ ShuttingDown → Closed`. `Closed` is terminal;
/// every session reaches it exactly once during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    ShuttingDown,
    Closed,
}

impl SessionState {
    /// Whether the session has finished its lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// How a session's teardown concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    /// The provider acknowledged the close (or had already exited) within
    /// the grace period.
    Clean,
    /// The provider had to be terminated or killed.
    Forced,
    /// The provider could not be confirmed dead.
    Unresponsive,
    /// No process was ever spawned for this session.
    NoProcess,
}

impl std::fmt::Display for CloseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseOutcome::Clean => "clean",
            CloseOutcome::Forced => "forced",
            CloseOutcome::Unresponsive => "unresponsive",
            CloseOutcome::NoProcess => "no_process",
        };
        write!(f, "{}", s)
    }
}

/// One tool-provider session as seen by the manager and the shutdown
/// coordinator.
///
/// The stdio-backed implementation lives in [`crate::session`]; tests
/// substitute in-memory providers behind the same seam.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The descriptor id this provider was configured with.
    fn id(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Bound the manager applies to this provider's handshake.
    fn startup_timeout(&self) -> Duration;

    /// Bound the manager applies to this provider's capability listing.
    fn list_timeout(&self) -> Duration;

    /// Launch the provider and perform the handshake, bounded by `timeout`.
    ///
    /// On timeout the caller is released, the session records `Failed`, and
    /// the child (if any) is left for the teardown pass to reap.
    async fn initialize(&self, timeout: Duration) -> SessionResult<()>;

    /// Request the provider's capabilities, bounded by `timeout`.
    ///
    /// Listing failures are soft: a timeout or an unrecognized response
    /// shape is logged and mapped to zero tools, and the session stays
    /// `Ready`.
    async fn list_tools(&self, timeout: Duration) -> Vec<ToolDescriptor>;

    /// Forward a call for a tool this provider itself listed.
    async fn invoke(&self, name: &str, args: Value, timeout: Duration) -> InvocationResult<Value>;

    /// Tear the session down: best-effort protocol close, then escalation.
    ///
    /// Safe to call from any state; concurrent and repeated calls observe
    /// the outcome of the single teardown sequence.
    async fn shutdown(&self, grace: Duration) -> CloseOutcome;
}
