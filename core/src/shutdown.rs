//! Total, bounded-time, idempotent teardown of the session fleet.
//!
//! The coordinator runs every session's own escalation ladder concurrently
//! and waits up to a caller-supplied total budget. Sessions that do not
//! confirm closure within the budget are reported unresponsive and logged;
//! the coordinator never retries and never blocks forward progress. The
//! embedding application is expected to enforce one further fixed grace
//! period before terminating the whole process.

use crate::traits::{CloseOutcome, ToolProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// Completion report for one teardown pass, per session in descriptor
/// order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ShutdownReport {
    pub sessions: Vec<(String, CloseOutcome)>,
    /// Whether every session confirmed closure within the budget.
    pub complete: bool,
}

impl ShutdownReport {
    /// Ids of sessions that did not confirm closure.
    pub fn unresponsive(&self) -> impl Iterator<Item = &str> {
        self.sessions
            .iter()
            .filter(|(_, outcome)| *outcome == CloseOutcome::Unresponsive)
            .map(|(id, _)| id.as_str())
    }
}

/// Guarantees exactly one teardown sequence per session, from any entry
/// point: the normal end-of-work path, a signal handler, or an
/// unexpected-error cleanup path.
pub struct ShutdownCoordinator {
    sessions: Vec<Arc<dyn ToolProvider>>,
    report: OnceCell<ShutdownReport>,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the session fleet, in descriptor order.
    pub fn new(sessions: Vec<Arc<dyn ToolProvider>>) -> Self {
        Self {
            sessions,
            report: OnceCell::new(),
        }
    }

    /// Tear down every session — Ready, Failed, Initializing and
    /// Uninitialized alike — within `total_budget`.
    ///
    /// Idempotent: concurrent and repeated callers await the single
    /// teardown pass and observe the identical report. The first caller's
    /// budget applies.
    pub async fn shutdown_all(&self, total_budget: Duration) -> ShutdownReport {
        self.report
            .get_or_init(|| self.run(total_budget))
            .await
            .clone()
    }

    async fn run(&self, total_budget: Duration) -> ShutdownReport {
        let count = self.sessions.len();
        info!(sessions = count, budget = ?total_budget, "Shutting down all sessions");

        // Per-session grace is half the budget: the remaining half covers
        // the terminate/kill rungs and scheduling slack.
        let grace = total_budget / 2;
        let deadline = Instant::now() + total_budget;

        let (tx, mut rx) = mpsc::channel(count.max(1));
        for (slot, session) in self.sessions.iter().enumerate() {
            let session = Arc::clone(session);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = session.shutdown(grace).await;
                let _ = tx.send((slot, outcome)).await;
            });
        }
        drop(tx);

        // Collect confirmations until everyone reported or the budget
        // elapsed; a stalled session costs the budget, never more.
        let mut outcomes: Vec<Option<CloseOutcome>> = vec![None; count];
        let mut confirmed = 0;
        while confirmed < count {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((slot, outcome))) => {
                    outcomes[slot] = Some(outcome);
                    confirmed += 1;
                }
                Ok(None) => break,
                Err(_) => break, // budget elapsed, stop waiting
            }
        }

        let mut sessions = Vec::with_capacity(count);
        for (slot, outcome) in outcomes.into_iter().enumerate() {
            let id = self.sessions[slot].id().to_string();
            let outcome = outcome.unwrap_or_else(|| {
                warn!(session = %id, "Session did not confirm closure within the budget");
                CloseOutcome::Unresponsive
            });
            sessions.push((id, outcome));
        }

        let complete = confirmed == count;
        if complete {
            info!(sessions = count, "All sessions confirmed closure");
        } else {
            warn!(
                confirmed,
                sessions = count,
                "Shutdown budget elapsed with unconfirmed sessions"
            );
        }

        ShutdownReport { sessions, complete }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{InvocationResult, SessionResult};
    use crate::protocol::ToolDescriptor;
    use crate::traits::SessionState;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts teardown sequences and can be made to stall.
    struct SlowProvider {
        id: String,
        teardowns: AtomicUsize,
        stall: Option<Duration>,
        outcome: CloseOutcome,
    }

    impl SlowProvider {
        fn prompt(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                teardowns: AtomicUsize::new(0),
                stall: None,
                outcome: CloseOutcome::Clean,
            })
        }

        fn stalling(id: &str, stall: Duration) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                teardowns: AtomicUsize::new(0),
                stall: Some(stall),
                outcome: CloseOutcome::Forced,
            })
        }
    }

    #[async_trait]
    impl ToolProvider for SlowProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn state(&self) -> SessionState {
            SessionState::Ready
        }

        fn startup_timeout(&self) -> Duration {
            Duration::from_millis(100)
        }

        fn list_timeout(&self) -> Duration {
            Duration::from_millis(100)
        }

        async fn initialize(&self, _timeout: Duration) -> SessionResult<()> {
            Ok(())
        }

        async fn list_tools(&self, _timeout: Duration) -> Vec<ToolDescriptor> {
            Vec::new()
        }

        async fn invoke(
            &self,
            _name: &str,
            _args: Value,
            _timeout: Duration,
        ) -> InvocationResult<Value> {
            Ok(Value::Null)
        }

        async fn shutdown(&self, _grace: Duration) -> CloseOutcome {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            self.outcome
        }
    }

    #[tokio::test]
    async fn test_all_sessions_confirm() {
        let coordinator = ShutdownCoordinator::new(vec![
            SlowProvider::prompt("a"),
            SlowProvider::prompt("b"),
        ]);
        let report = coordinator.shutdown_all(Duration::from_secs(1)).await;
        assert!(report.complete);
        assert_eq!(report.sessions.len(), 2);
        assert!(report
            .sessions
            .iter()
            .all(|(_, o)| *o == CloseOutcome::Clean));
    }

    #[tokio::test]
    async fn test_budget_bounds_a_stalled_session() {
        let stalled = SlowProvider::stalling("b", Duration::from_secs(30));
        let coordinator = ShutdownCoordinator::new(vec![
            SlowProvider::prompt("a"),
            stalled,
            SlowProvider::prompt("c"),
        ]);

        let started = std::time::Instant::now();
        let report = coordinator.shutdown_all(Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(!report.complete);
        assert_eq!(report.sessions[0].1, CloseOutcome::Clean);
        assert_eq!(report.sessions[1].1, CloseOutcome::Unresponsive);
        assert_eq!(report.sessions[2].1, CloseOutcome::Clean);
        assert_eq!(report.unresponsive().collect::<Vec<_>>(), ["b"]);
    }

    #[tokio::test]
    async fn test_repeated_calls_one_teardown_sequence() {
        let provider = SlowProvider::prompt("a");
        let coordinator = ShutdownCoordinator::new(vec![provider.clone()]);

        let first = coordinator.shutdown_all(Duration::from_secs(1)).await;
        let second = coordinator.shutdown_all(Duration::from_secs(1)).await;

        assert_eq!(provider.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(first.sessions, second.sessions);
        assert_eq!(first.complete, second.complete);
    }

    #[tokio::test]
    async fn test_concurrent_calls_observe_same_report() {
        let provider = SlowProvider::prompt("a");
        let coordinator = Arc::new(ShutdownCoordinator::new(vec![provider.clone()]));

        let left = {
            let c = Arc::clone(&coordinator);
            tokio::spawn(async move { c.shutdown_all(Duration::from_secs(1)).await })
        };
        let right = {
            let c = Arc::clone(&coordinator);
            tokio::spawn(async move { c.shutdown_all(Duration::from_secs(1)).await })
        };

        let (left, right) = (left.await.unwrap(), right.await.unwrap());
        assert_eq!(provider.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(left.sessions, right.sessions);
    }
}
