//! Session descriptors: immutable configuration for one tool provider.

use crate::errors::ConfigError;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Default bound for the initialize handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for the capability-listing request.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable configuration for a single tool-provider session.
///
/// Descriptors are produced by the embedding application (config file
/// parsing lives outside this crate) and handed to the manager once, at
/// construction. Descriptor order is significant: tool-name collisions
/// resolve to the first descriptor that registered the name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionDescriptor {
    /// Unique identifier, used to tag tools and report outcomes.
    pub id: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Bound on the initialize handshake.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: Duration,
    /// Bound on the tool-listing request.
    #[serde(default = "default_list_timeout")]
    pub list_timeout: Duration,
}

fn default_startup_timeout() -> Duration {
    DEFAULT_STARTUP_TIMEOUT
}

fn default_list_timeout() -> Duration {
    DEFAULT_LIST_TIMEOUT
}

impl SessionDescriptor {
    /// Create a descriptor with default timeouts and no extra environment.
    pub fn new(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args,
            env: HashMap::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    /// Override the startup timeout.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the tool-listing timeout.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Add an environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Validate a descriptor set before any process is spawned.
///
/// This is the only hard-error gate in the subsystem: an empty set,
/// an empty id or command, or a duplicate id rejects the whole
/// configuration. Everything after this point degrades per-session.
pub fn validate_descriptors(descriptors: &[SessionDescriptor]) -> Result<(), ConfigError> {
    if descriptors.is_empty() {
        return Err(ConfigError::EmptyDescriptorSet);
    }

    let mut seen = HashSet::new();
    for desc in descriptors {
        if desc.id.is_empty() {
            return Err(ConfigError::EmptySessionId);
        }
        if desc.command.is_empty() {
            return Err(ConfigError::EmptyCommand(desc.id.clone()));
        }
        if !seen.insert(desc.id.as_str()) {
            return Err(ConfigError::DuplicateSessionId(desc.id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_distinct_ids() {
        let descriptors = vec![
            SessionDescriptor::new("core", "provider", vec![]),
            SessionDescriptor::new("docs", "provider", vec![]),
        ];
        assert!(validate_descriptors(&descriptors).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_set() {
        assert!(matches!(
            validate_descriptors(&[]),
            Err(ConfigError::EmptyDescriptorSet)
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_id() {
        let descriptors = vec![
            SessionDescriptor::new("core", "provider", vec![]),
            SessionDescriptor::new("core", "other", vec![]),
        ];
        assert!(matches!(
            validate_descriptors(&descriptors),
            Err(ConfigError::DuplicateSessionId(id)) if id == "core"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let descriptors = vec![SessionDescriptor::new("core", "", vec![])];
        assert!(matches!(
            validate_descriptors(&descriptors),
            Err(ConfigError::EmptyCommand(id)) if id == "core"
        ));
    }
}
