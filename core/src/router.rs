//! Routing from aggregate tool names back to their owning session.

use std::collections::HashMap;

/// O(1)-expected lookup from tool name to the owning session's slot in the
/// manager's descriptor-ordered session list.
///
/// Built once alongside the registry; read-only afterward. An absent name
/// is a caller error answered here, without touching any child process.
#[derive(Debug, Default)]
pub struct InvocationRouter {
    routes: HashMap<String, usize>,
}

impl InvocationRouter {
    /// Create an empty router (routes nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool name for the session at `slot`. First registration
    /// wins; returns false (and keeps the existing route) on collision.
    pub fn register(&mut self, name: &str, slot: usize) -> bool {
        if self.routes.contains_key(name) {
            return false;
        }
        self.routes.insert(name.to_string(), slot);
        true
    }

    /// Resolve a tool name to its owning session slot.
    pub fn route(&self, name: &str) -> Option<usize> {
        self.routes.get(name).copied()
    }

    /// Number of routable tool names.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether any tools are routable.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
