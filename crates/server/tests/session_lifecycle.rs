//! Session lifecycle integration tests.
//!
//! These run against a `/bin/sh` script that imitates the LLDB REPL:
//! - Start, execute, terminate
//! - Dead and silent debuggers
//! - Isolation between concurrent sessions

use std::sync::Arc;
use std::time::Duration;

use lldb_mcp::session::{
    Annotation, ManagerConfig, Readiness, SessionError, SessionLifecycleManager, SessionRegistry,
    StartOptions,
};
use lldb_mcp::tools::commands;

/// Prints `(lldb) ` after each response. `$$` tags output with the shell pid.
const FAKE_LLDB: &str = r#"
while IFS= read -r line; do
  case "$line" in
    version) echo "lldb-fake version 17.0.6" ;;
    quit) exit 0 ;;
    "breakpoint set --name main") echo "Breakpoint 1: where = demo\`main + 8 at demo.c:4:3, address = 0x0000000100003f70" ;;
    continue) echo "Process 4242 resuming"; echo "Process 4242 exited with status = 0 (0x00000000)" ;;
    hang) echo "working..."; continue ;;
    crash) echo "bye"; exit 9 ;;
    *) echo "[$$] $line" ;;
  esac
  printf '(lldb) '
done
"#;

fn manager_with(max_sessions: usize) -> Arc<SessionLifecycleManager> {
    let config = ManagerConfig {
        executable: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), FAKE_LLDB.to_string()],
        env: Vec::new(),
        readiness: Readiness {
            poll_interval: Duration::from_millis(20),
            start_timeout: Duration::from_secs(3),
            ..Readiness::default()
        },
        command_timeout: Duration::from_millis(400),
        idle_settle: None,
        shutdown_grace: Duration::from_millis(500),
        max_sessions,
    };
    Arc::new(SessionLifecycleManager::new(
        config,
        Arc::new(SessionRegistry::new()),
    ))
}

fn manager() -> Arc<SessionLifecycleManager> {
    manager_with(0)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_debugging_round_trip() {
    let manager = manager();

    let started = manager.start(StartOptions::default()).await.unwrap();
    assert!(started.banner.contains("lldb-fake version 17.0.6"));

    let bp = manager
        .execute(&started.id, &commands::breakpoint_set("main"))
        .await
        .unwrap();
    assert!(bp.is_complete());
    assert_eq!(commands::breakpoint_id(&bp.text), Some(1));

    let cont = manager.execute(&started.id, "continue").await.unwrap();
    assert!(cont.is_complete());
    assert!(cont.text.contains("exited with status = 0"));

    manager.terminate(&started.id).await.unwrap();
    assert_eq!(manager.count(), 0);

    let err = manager.execute(&started.id, "bt").await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn test_many_starts_give_distinct_ids() {
    let manager = manager();

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(manager.start(StartOptions::default()).await.unwrap().id);
    }

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 4);

    let listed: Vec<_> = manager.list().await.into_iter().map(|s| s.id).collect();
    assert_eq!(listed, ids);

    assert_eq!(manager.shutdown_all().await, 4);
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn test_unknown_ids_leave_registry_alone() {
    let manager = manager();
    let started = manager.start(StartOptions::default()).await.unwrap();

    assert!(matches!(
        manager.execute("nope", "bt").await,
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        manager.terminate("nope").await,
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        manager.set_target("nope", "/bin/true").await,
        Err(SessionError::NotFound(_))
    ));

    assert_eq!(manager.count(), 1);
    assert_eq!(manager.list().await[0].id, started.id);

    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_terminate_twice() {
    let manager = manager();
    let started = manager.start(StartOptions::default()).await.unwrap();

    manager.terminate(&started.id).await.unwrap();
    assert!(manager.list().await.is_empty());
    assert!(matches!(
        manager.terminate(&started.id).await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_missing_executable_registers_nothing() {
    let config = ManagerConfig {
        executable: "/definitely/not/lldb".to_string(),
        ..ManagerConfig::default()
    };
    let manager = SessionLifecycleManager::new(config, Arc::new(SessionRegistry::new()));

    let err = manager.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, SessionError::StartFailed(_)));
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn test_session_limit() {
    let manager = manager_with(1);
    manager.start(StartOptions::default()).await.unwrap();

    let err = manager.start(StartOptions::default()).await.unwrap_err();
    assert!(matches!(err, SessionError::StartFailed(msg) if msg.contains("maximum")));

    manager.shutdown_all().await;
}

// =============================================================================
// Soft outcomes
// =============================================================================

#[tokio::test]
async fn test_silent_debugger_times_out_with_partial_output() {
    let manager = manager();
    let started = manager.start(StartOptions::default()).await.unwrap();

    let output = manager.execute(&started.id, "hang").await.unwrap();
    assert!(output.timed_out());
    assert!(output.text.contains("working..."));
    assert!(output
        .render()
        .ends_with("[Timeout waiting for debugger response after 0.4 seconds for command: hang]"));

    // The session is still usable after a timeout.
    let next = manager.execute(&started.id, "frame variable").await.unwrap();
    assert!(next.text.contains("frame variable"));

    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_exit_is_reported_once() {
    let manager = manager();
    let started = manager.start(StartOptions::default()).await.unwrap();

    let output = manager.execute(&started.id, "crash").await.unwrap();
    assert!(output.text.contains("bye"));
    assert!(matches!(
        output.annotations.as_slice(),
        [Annotation::Exited(info)] if info.code == Some(9)
    ));

    let err = manager.execute(&started.id, "bt").await.unwrap_err();
    assert!(matches!(err, SessionError::ProcessError(_)));

    // A dead session can still be terminated.
    manager.terminate(&started.id).await.unwrap();
    assert_eq!(manager.count(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let manager = manager();
    let a = manager.start(StartOptions::default()).await.unwrap();
    let b = manager.start(StartOptions::default()).await.unwrap();

    let run = |id: String, tag: &'static str| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for i in 0..10 {
                let out = manager
                    .execute(&id, &format!("print {}-{}", tag, i))
                    .await
                    .unwrap();
                seen.push(out.text);
            }
            seen
        })
    };

    let (seen_a, seen_b) = tokio::join!(run(a.id.clone(), "alpha"), run(b.id.clone(), "beta"));
    let (seen_a, seen_b) = (seen_a.unwrap(), seen_b.unwrap());

    for (i, text) in seen_a.iter().enumerate() {
        assert!(text.ends_with(&format!("print alpha-{}", i)), "{}", text);
        assert!(!text.contains("beta"));
    }
    for (i, text) in seen_b.iter().enumerate() {
        assert!(text.ends_with(&format!("print beta-{}", i)), "{}", text);
        assert!(!text.contains("alpha"));
    }

    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_commands_on_one_session_do_not_interleave() {
    let manager = manager();
    let started = manager.start(StartOptions::default()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        let id = started.id.clone();
        handles.push(tokio::spawn(async move {
            let out = manager.execute(&id, &format!("cmd-{}", i)).await.unwrap();
            (i, out.text)
        }));
    }

    for handle in handles {
        let (i, text) = handle.await.unwrap();
        assert!(text.ends_with(&format!("cmd-{}", i)), "{}", text);
        assert_eq!(text.lines().count(), 1, "{}", text);
    }

    manager.shutdown_all().await;
}
