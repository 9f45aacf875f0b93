// Spinoza: tool-provider session orchestration
// Core library: descriptors, stdio sessions, registry/manager, routing,
// and bounded-time teardown

pub mod descriptor;
pub mod errors;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod traits;

// Re-export commonly used types
pub use descriptor::{
    validate_descriptors, SessionDescriptor, DEFAULT_LIST_TIMEOUT, DEFAULT_STARTUP_TIMEOUT,
};

pub use errors::{
    ConfigError, InvocationError, InvocationResult, SessionError, SessionResult,
};

pub use protocol::{normalize_tool_list, ToolDescriptor};

pub use registry::{InitSummary, RegisteredTool, Registry, SessionManager, SessionOutcome};

pub use router::InvocationRouter;

pub use session::StdioSession;

pub use shutdown::{ShutdownCoordinator, ShutdownReport};

pub use traits::{CloseOutcome, SessionState, ToolProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
