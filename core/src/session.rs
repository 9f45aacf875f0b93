/// Stdio-backed tool-provider sessions.
///
/// Each session exclusively owns one child process and its protocol
/// exchange: handshake, capability listing, tool invocation, and the
/// graceful → terminate → kill teardown ladder. Every child-facing wait is
/// wrapped in its caller's bound; a session that stops answering can stall
/// its own worker for at most that bound, never the rest of the fleet.
use crate::descriptor::SessionDescriptor;
use crate::errors::{InvocationError, InvocationResult, SessionError, SessionResult};
use crate::protocol::{self, Response, ToolDescriptor};
use crate::traits::{CloseOutcome, SessionState, ToolProvider};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex, OnceCell};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How long to wait for exit after SIGTERM before escalating to kill.
const TERM_WAIT: Duration = Duration::from_millis(500);

/// How long to wait for the kill itself to be confirmed.
const KILL_WAIT: Duration = Duration::from_millis(250);

/// Internal failure modes of a single bounded request.
enum RequestError {
    Timeout,
    Transport(String),
}

/// A tool-provider session backed by a child process on stdio.
pub struct StdioSession {
    descriptor: SessionDescriptor,
    state: RwLock<SessionState>,
    last_error: RwLock<Option<String>>,
    /// The child process, exclusively owned. Taken once, by teardown.
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    /// In-flight requests awaiting a response, keyed by request id.
    pending: Arc<DashMap<u64, oneshot::Sender<Value>>>,
    next_id: AtomicU64,
    /// Tool names this session itself listed; invokes are checked against
    /// this set before anything is forwarded.
    listed: RwLock<HashSet<String>>,
    /// Guards the single teardown sequence; later callers observe the
    /// recorded outcome.
    close_outcome: OnceCell<CloseOutcome>,
}

impl StdioSession {
    /// Create an unlaunched session for the given descriptor.
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self {
            descriptor,
            state: RwLock::new(SessionState::Uninitialized),
            last_error: RwLock::new(None),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            listed: RwLock::new(HashSet::new()),
            close_outcome: OnceCell::new(),
        }
    }

    /// The descriptor this session was built from.
    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    /// The most recent failure reason, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Transition `from → to` atomically; returns false if another path
    /// (typically shutdown) got there first.
    fn transition_if(&self, from: SessionState, to: SessionState) -> bool {
        let mut guard = self.state.write();
        if *guard == from {
            *guard = to;
            true
        } else {
            false
        }
    }

    fn record_failure(&self, reason: &str) {
        *self.last_error.write() = Some(reason.to_string());
        // A shutdown racing the failure keeps its own state
        self.transition_if(SessionState::Initializing, SessionState::Failed);
    }

    /// Launch the child process and wire up its stdio.
    async fn spawn_child(&self) -> SessionResult<()> {
        let mut command = Command::new(&self.descriptor.command);
        command
            .args(&self.descriptor.args)
            .envs(&self.descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("failed to capture stderr".to_string()))?;

        *self.child.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);

        self.spawn_stdout_router(stdout);
        self.spawn_stderr_logger(stderr);

        Ok(())
    }

    /// Route response lines to their waiting requests by id.
    fn spawn_stdout_router(&self, stdout: ChildStdout) {
        let pending = Arc::clone(&self.pending);
        let session_id = self.descriptor.id.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF: process exited or closed stdout
                    Ok(_) => {
                        let raw: Value = match serde_json::from_str(line.trim()) {
                            Ok(v) => v,
                            Err(e) => {
                                debug!(session = %session_id, "Discarding non-JSON line: {}", e);
                                continue;
                            }
                        };
                        let Some(id) = raw.get("id").and_then(Value::as_u64) else {
                            debug!(session = %session_id, "Discarding message without id");
                            continue;
                        };
                        match pending.remove(&id) {
                            Some((_, tx)) => {
                                // Receiver gone means the request timed out
                                let _ = tx.send(raw);
                            }
                            None => {
                                debug!(session = %session_id, request_id = id, "Response for unknown request");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(session = %session_id, "stdout read error: {}", e);
                        break;
                    }
                }
            }
            // Wake every waiter with a transport error by dropping senders
            pending.clear();
        });
    }

    fn spawn_stderr_logger(&self, stderr: ChildStderr) {
        let session_id = self.descriptor.id.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => debug!(session = %session_id, "stderr: {}", line.trim_end()),
                }
            }
        });
    }

    /// Send one request and wait for its response within `bound`.
    async fn request(
        &self,
        method: &str,
        params: Value,
        bound: Duration,
    ) -> Result<Response, RequestError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let line = protocol::request_line(id, method, params);
        {
            let mut stdin = self.stdin.lock().await;
            let Some(stdin) = stdin.as_mut() else {
                self.pending.remove(&id);
                return Err(RequestError::Transport("stdin closed".to_string()));
            };
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.remove(&id);
                return Err(RequestError::Transport(e.to_string()));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.remove(&id);
                return Err(RequestError::Transport(e.to_string()));
            }
        }

        match timeout(bound, rx).await {
            Ok(Ok(raw)) => Ok(protocol::split_response(raw)),
            Ok(Err(_)) => Err(RequestError::Transport(
                "provider closed the connection".to_string(),
            )),
            Err(_) => {
                // Release the caller on schedule; the underlying wait on the
                // child is not confirmed cancelled, only abandoned.
                self.pending.remove(&id);
                Err(RequestError::Timeout)
            }
        }
    }

    /// Best-effort in-protocol close message. No response is awaited; exit
    /// is what matters, and the escalation ladder covers the rest.
    async fn send_close_message(&self) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = protocol::request_line(id, "shutdown", json!({}));
        let mut stdin = self.stdin.lock().await;
        if let Some(handle) = stdin.as_mut() {
            if handle.write_all(line.as_bytes()).await.is_ok() {
                let _ = handle.flush().await;
            }
        }
        // Dropping stdin signals EOF, which well-behaved providers treat as
        // a close on its own.
        *stdin = None;
    }

    /// The escalation ladder: wait for exit within `grace`, then SIGTERM,
    /// then kill. Runs exactly once per session.
    async fn run_teardown(&self, grace: Duration) -> CloseOutcome {
        let previous = self.state();
        self.set_state(SessionState::ShuttingDown);

        let mut child = match self.child.lock().await.take() {
            Some(child) => child,
            None => {
                debug!(session = %self.descriptor.id, "No process to reap");
                self.set_state(SessionState::Closed);
                return CloseOutcome::NoProcess;
            }
        };

        debug!(
            session = %self.descriptor.id,
            from = %previous,
            "Beginning teardown"
        );

        self.send_close_message().await;

        let outcome = match timeout(grace, child.wait()).await {
            Ok(Ok(_)) => {
                info!(session = %self.descriptor.id, "Provider exited cleanly");
                CloseOutcome::Clean
            }
            _ => self.escalate(&mut child).await,
        };

        self.set_state(SessionState::Closed);
        outcome
    }

    /// Terminate, then kill, with a bounded wait between rungs.
    async fn escalate(&self, child: &mut Child) -> CloseOutcome {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                warn!(session = %self.descriptor.id, "Provider ignored close, sending SIGTERM");
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && timeout(TERM_WAIT, child.wait()).await.is_ok()
                {
                    return CloseOutcome::Forced;
                }
            }
        }

        warn!(session = %self.descriptor.id, "Provider ignored termination, killing");
        match timeout(KILL_WAIT, child.kill()).await {
            Ok(Ok(())) => CloseOutcome::Forced,
            _ => {
                warn!(session = %self.descriptor.id, "Provider could not be confirmed dead");
                CloseOutcome::Unresponsive
            }
        }
    }
}

#[async_trait]
impl ToolProvider for StdioSession {
    fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn startup_timeout(&self) -> Duration {
        self.descriptor.startup_timeout
    }

    fn list_timeout(&self) -> Duration {
        self.descriptor.list_timeout
    }

    async fn initialize(&self, bound: Duration) -> SessionResult<()> {
        if !self.transition_if(SessionState::Uninitialized, SessionState::Initializing) {
            let state = self.state();
            return Err(SessionError::NotReady(state.to_string()));
        }

        if let Err(e) = self.spawn_child().await {
            warn!(session = %self.descriptor.id, "Spawn failed: {}", e);
            self.record_failure(&e.to_string());
            return Err(e);
        }

        let params = json!({
            "clientInfo": {
                "name": "spinoza",
                "version": crate::VERSION,
            }
        });

        match self.request("initialize", params, bound).await {
            Ok(Response::Result(_)) => {
                if self.transition_if(SessionState::Initializing, SessionState::Ready) {
                    info!(session = %self.descriptor.id, "Session ready");
                    Ok(())
                } else {
                    // Shutdown raced the handshake and won
                    Err(SessionError::NotReady(self.state().to_string()))
                }
            }
            Ok(Response::Error(err)) => {
                let reason = format!("handshake rejected: {}", err);
                warn!(session = %self.descriptor.id, "{}", reason);
                self.record_failure(&reason);
                Err(SessionError::Protocol(reason))
            }
            Err(RequestError::Timeout) => {
                // The process is deliberately left running: killing a
                // misbehaving child here could block this worker, so
                // reaping is deferred to teardown.
                warn!(
                    session = %self.descriptor.id,
                    "Handshake timed out after {:?}", bound
                );
                self.record_failure(&format!("handshake timed out after {:?}", bound));
                Err(SessionError::StartupTimeout(bound))
            }
            Err(RequestError::Transport(reason)) => {
                warn!(session = %self.descriptor.id, "Handshake transport failure: {}", reason);
                self.record_failure(&reason);
                Err(SessionError::Transport(reason))
            }
        }
    }

    async fn list_tools(&self, bound: Duration) -> Vec<ToolDescriptor> {
        if self.state() != SessionState::Ready {
            debug!(session = %self.descriptor.id, "Listing skipped: session not ready");
            return Vec::new();
        }

        let result = match self.request("tools/list", json!({}), bound).await {
            Ok(Response::Result(v)) => v,
            Ok(Response::Error(err)) => {
                warn!(session = %self.descriptor.id, "Listing rejected, treating as zero tools: {}", err);
                return Vec::new();
            }
            Err(RequestError::Timeout) => {
                warn!(session = %self.descriptor.id, "Listing timed out after {:?}, treating as zero tools", bound);
                return Vec::new();
            }
            Err(RequestError::Transport(reason)) => {
                warn!(session = %self.descriptor.id, "Listing transport failure, treating as zero tools: {}", reason);
                return Vec::new();
            }
        };

        match protocol::normalize_tool_list(result) {
            Ok(tools) => {
                let mut listed = self.listed.write();
                for tool in &tools {
                    listed.insert(tool.name.clone());
                }
                tools
            }
            Err(shape) => {
                warn!(session = %self.descriptor.id, "{}, treating as zero tools", shape);
                Vec::new()
            }
        }
    }

    async fn invoke(&self, name: &str, args: Value, bound: Duration) -> InvocationResult<Value> {
        // Caller error: this session never listed that name, so nothing is
        // forwarded to the child.
        if !self.listed.read().contains(name) {
            return Err(InvocationError::UnknownTool(name.to_string()));
        }

        let state = self.state();
        if state != SessionState::Ready {
            return Err(InvocationError::Transport(format!(
                "session '{}' is {}",
                self.descriptor.id, state
            )));
        }

        let params = json!({ "name": name, "arguments": args });
        match self.request("tools/call", params, bound).await {
            Ok(Response::Result(v)) => Ok(v),
            Ok(Response::Error(err)) => Err(InvocationError::Child(err)),
            Err(RequestError::Timeout) => Err(InvocationError::Timeout(bound)),
            Err(RequestError::Transport(reason)) => Err(InvocationError::Transport(reason)),
        }
    }

    async fn shutdown(&self, grace: Duration) -> CloseOutcome {
        *self
            .close_outcome
            .get_or_init(|| self.run_teardown(grace))
            .await
    }
}
