//! Aggregate tool registry and the session manager that builds it.
//!
//! The manager owns every session handle, drives one concurrent
//! initialization pass, and merges each Ready session's tools into a
//! registry that is built exactly once and read-only afterward. Individual
//! session failures are bulkhead-isolated: they show up in the summary,
//! never as errors.

use crate::descriptor::{validate_descriptors, SessionDescriptor};
use crate::errors::{ConfigError, InvocationError, InvocationResult};
use crate::protocol::ToolDescriptor;
use crate::router::InvocationRouter;
use crate::session::StdioSession;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::traits::ToolProvider;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// A tool in the aggregate view, tagged with its owning session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegisteredTool {
    pub name: String,
    pub metadata: Value,
    pub owner: String,
}

/// The merged, aggregate view of tools across all Ready sessions.
///
/// Ordered by descriptor order, then by each session's listing order.
#[derive(Debug, Default)]
pub struct Registry {
    tools: Vec<RegisteredTool>,
}

impl Registry {
    /// All registered tools, in deterministic order.
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    /// Look up one tool by aggregate name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Per-session outcome of the initialization pass.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Ready { tool_count: usize },
    Failed { reason: String },
}

/// Machine-readable result of `initialize_all`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InitSummary {
    pub ready: usize,
    pub failed: usize,
    /// Outcomes in descriptor order, keyed by session id.
    pub sessions: Vec<(String, SessionOutcome)>,
}

/// What one session's init worker produced.
enum WorkerResult {
    Ready(Vec<ToolDescriptor>),
    Failed(String),
}

/// Drives the session fleet: concurrent bounded initialization, the
/// build-once registry, invocation routing, and teardown delegation.
pub struct SessionManager {
    sessions: Vec<Arc<dyn ToolProvider>>,
    built: OnceCell<(Registry, InvocationRouter, InitSummary)>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl SessionManager {
    /// Build a manager from a descriptor set.
    ///
    /// A structurally invalid set is the only hard error in the subsystem;
    /// nothing is spawned here.
    pub fn new(descriptors: Vec<SessionDescriptor>) -> Result<Self, ConfigError> {
        validate_descriptors(&descriptors)?;
        let sessions: Vec<Arc<dyn ToolProvider>> = descriptors
            .into_iter()
            .map(|d| Arc::new(StdioSession::new(d)) as Arc<dyn ToolProvider>)
            .collect();
        Ok(Self::from_providers(sessions))
    }

    /// Build a manager over pre-constructed providers. Descriptor order is
    /// the order of `sessions`.
    pub fn from_providers(sessions: Vec<Arc<dyn ToolProvider>>) -> Self {
        let coordinator = Arc::new(ShutdownCoordinator::new(sessions.clone()));
        Self {
            sessions,
            built: OnceCell::new(),
            coordinator,
        }
    }

    /// Number of configured sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Initialize every session concurrently and build the registry.
    ///
    /// One worker per session: a hanging provider delays nobody else, and
    /// the pass completes within roughly the largest configured timeout.
    /// Runs at most once; repeated calls return the recorded summary.
    pub async fn initialize_all(&self) -> InitSummary {
        let (_, _, summary) = self.built.get_or_init(|| self.run_init_pass()).await;
        summary.clone()
    }

    async fn run_init_pass(&self) -> (Registry, InvocationRouter, InitSummary) {
        let workers = self.sessions.iter().map(|session| {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                match session.initialize(session.startup_timeout()).await {
                    Ok(()) => {
                        let tools = session.list_tools(session.list_timeout()).await;
                        WorkerResult::Ready(tools)
                    }
                    Err(e) => WorkerResult::Failed(e.to_string()),
                }
            })
        });

        // join_all yields results in input order, so the merge below is
        // deterministic in descriptor order regardless of completion order.
        let results = join_all(workers).await;

        let mut registry = Registry::default();
        let mut router = InvocationRouter::new();
        let mut outcomes = Vec::with_capacity(self.sessions.len());
        let (mut ready, mut failed) = (0, 0);

        for (slot, result) in results.into_iter().enumerate() {
            let id = self.sessions[slot].id().to_string();
            let result = result.unwrap_or_else(|e| {
                WorkerResult::Failed(format!("initialization worker panicked: {}", e))
            });
            match result {
                WorkerResult::Ready(tools) => {
                    ready += 1;
                    let mut registered = 0;
                    for tool in tools {
                        if router.register(&tool.name, slot) {
                            registry.tools.push(RegisteredTool {
                                name: tool.name,
                                metadata: tool.metadata,
                                owner: id.clone(),
                            });
                            registered += 1;
                        } else {
                            let kept = registry
                                .get(&tool.name)
                                .map(|t| t.owner.clone())
                                .unwrap_or_default();
                            warn!(
                                tool = %tool.name,
                                kept = %kept,
                                dropped = %id,
                                "Tool name collision, first-registered session wins"
                            );
                        }
                    }
                    outcomes.push((
                        id,
                        SessionOutcome::Ready {
                            tool_count: registered,
                        },
                    ));
                }
                WorkerResult::Failed(reason) => {
                    failed += 1;
                    outcomes.push((id, SessionOutcome::Failed { reason }));
                }
            }
        }

        info!(
            ready,
            failed,
            tools = registry.len(),
            "Initialization pass complete"
        );

        let summary = InitSummary {
            ready,
            failed,
            sessions: outcomes,
        };
        (registry, router, summary)
    }

    /// The registry as of the initialization pass; `None` before it ran.
    pub fn registry(&self) -> Option<&Registry> {
        self.built.get().map(|(registry, _, _)| registry)
    }

    /// The aggregate tool list as of the last pass. No children are
    /// re-queried.
    pub fn list_tools(&self) -> &[RegisteredTool] {
        self.registry().map(Registry::tools).unwrap_or(&[])
    }

    /// Invoke a tool by aggregate name, routed to its owning session.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        timeout: Duration,
    ) -> InvocationResult<Value> {
        let Some((_, router, _)) = self.built.get() else {
            return Err(InvocationError::UnknownTool(name.to_string()));
        };
        let Some(slot) = router.route(name) else {
            return Err(InvocationError::UnknownTool(name.to_string()));
        };
        self.sessions[slot].invoke(name, args, timeout).await
    }

    /// The shutdown coordinator, cloneable into signal handlers and exit
    /// hooks.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Tear down every session within `total_budget`. Delegates to the
    /// coordinator; see [`ShutdownCoordinator::shutdown_all`].
    pub async fn shutdown_all(&self, total_budget: Duration) -> ShutdownReport {
        self.coordinator.shutdown_all(total_budget).await
    }
}
