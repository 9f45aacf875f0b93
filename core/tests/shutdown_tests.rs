/// Integration tests for coordinated teardown against real stub providers.
use spinoza_core::{
    CloseOutcome, SessionDescriptor, SessionManager, SessionState, StdioSession, ToolProvider,
};
use std::time::{Duration, Instant};

fn stub_bin() -> String {
    env!("CARGO_BIN_EXE_stub_provider").to_string()
}

fn provider(id: &str, extra: &[&str]) -> SessionDescriptor {
    let mut args = vec!["--tool".to_string(), "ping".to_string()];
    args.extend(extra.iter().map(|f| f.to_string()));
    SessionDescriptor::new(id, stub_bin(), args)
}

#[tokio::test]
async fn test_stubborn_provider_is_forced_within_budget() {
    let manager = SessionManager::new(vec![
        provider("a", &[]),
        provider("b", &["--ignore-shutdown"]),
        provider("c", &[]),
    ])
    .expect("valid descriptors");
    manager.initialize_all().await;

    let started = Instant::now();
    let report = manager.shutdown_all(Duration::from_secs(2)).await;
    // Budget bounds the whole pass, not each session
    assert!(started.elapsed() < Duration::from_secs(4));

    assert!(report.complete);
    assert_eq!(report.sessions.len(), 3);
    assert_eq!(report.sessions[0].1, CloseOutcome::Clean);
    assert!(matches!(
        report.sessions[1].1,
        CloseOutcome::Forced | CloseOutcome::Unresponsive
    ));
    assert_eq!(report.sessions[2].1, CloseOutcome::Clean);
}

#[tokio::test]
async fn test_repeated_shutdown_returns_same_report() {
    let manager =
        SessionManager::new(vec![provider("a", &[]), provider("b", &[])]).expect("valid");
    manager.initialize_all().await;

    let first = manager.shutdown_all(Duration::from_secs(5)).await;
    let started = Instant::now();
    let second = manager.shutdown_all(Duration::from_secs(5)).await;

    // Second call resolves from the recorded report without touching processes
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(first.sessions, second.sessions);
    assert_eq!(first.complete, second.complete);
}

#[tokio::test]
async fn test_concurrent_shutdown_callers_share_one_pass() {
    let manager = std::sync::Arc::new(
        SessionManager::new(vec![provider("a", &[]), provider("b", &[])]).expect("valid"),
    );
    manager.initialize_all().await;

    let m1 = std::sync::Arc::clone(&manager);
    let m2 = std::sync::Arc::clone(&manager);
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.shutdown_all(Duration::from_secs(5)).await }),
        tokio::spawn(async move { m2.shutdown_all(Duration::from_secs(5)).await }),
    );
    let (r1, r2) = (r1.expect("task"), r2.expect("task"));

    assert_eq!(r1.sessions, r2.sessions);
    assert!(r1.complete);
}

#[tokio::test]
async fn test_shutdown_wins_race_against_initialize() {
    let session = std::sync::Arc::new(StdioSession::new(
        provider("racer", &["--hang-init"]).with_startup_timeout(Duration::from_secs(10)),
    ));

    let init_session = std::sync::Arc::clone(&session);
    let init_task =
        tokio::spawn(async move { init_session.initialize(Duration::from_secs(10)).await });

    // Let the handshake get in flight, then tear down underneath it
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(session.state(), SessionState::Initializing);

    let outcome = session.shutdown(Duration::from_secs(1)).await;
    assert!(matches!(
        outcome,
        CloseOutcome::Clean | CloseOutcome::Forced | CloseOutcome::Unresponsive
    ));
    assert_eq!(session.state(), SessionState::Closed);

    // The pending handshake resolves with an error instead of hanging
    let init_result = tokio::time::timeout(Duration::from_secs(5), init_task)
        .await
        .expect("initialize should unblock once the child is gone")
        .expect("task");
    assert!(init_result.is_err());

    // The session never flips back out of its terminal state
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_shutdown_before_initialize_reports_no_process() {
    let session = StdioSession::new(provider("idle", &[]));
    let outcome = session.shutdown(Duration::from_secs(1)).await;
    assert_eq!(outcome, CloseOutcome::NoProcess);
    assert_eq!(session.state(), SessionState::Closed);
}
