//! Session lifecycle: start, execute, terminate, shutdown and reaping.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::boundary::{BoundaryDetector, PromptMarkerDetector};
use super::error::{SessionError, SessionId};
use super::executor::{CommandExecutor, CommandOutput};
use super::launcher::{launch, LaunchSpec, Readiness, KILL_WAIT};
use super::registry::{Session, SessionRegistry, SessionSummary};

/// Command sent to ask the debugger to exit.
const QUIT_COMMAND: &str = "quit";

/// Settings the manager needs to start and drive sessions.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Default debugger executable.
    pub executable: String,
    /// Extra debugger arguments.
    pub args: Vec<String>,
    /// Extra environment for the debugger.
    pub env: Vec<(String, String)>,
    /// Readiness handshake parameters.
    pub readiness: Readiness,
    /// Per-command timeout.
    pub command_timeout: Duration,
    /// Silence after which a prompt-echo framed response is accepted.
    pub idle_settle: Option<Duration>,
    /// Timeout for the graceful `quit` during terminate.
    pub shutdown_grace: Duration,
    /// Maximum concurrent sessions (0 = unlimited).
    pub max_sessions: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            executable: "lldb".to_string(),
            args: Vec::new(),
            env: Vec::new(),
            readiness: Readiness::default(),
            command_timeout: Duration::from_millis(10000),
            idle_settle: Some(Duration::from_millis(1000)),
            shutdown_grace: Duration::from_millis(2000),
            max_sessions: 0,
        }
    }
}

/// Options for starting a session.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Debugger executable; the configured default when `None`.
    pub executable: Option<String>,
    /// Working directory; the current directory when `None`.
    pub working_dir: Option<PathBuf>,
}

/// A successfully started session.
#[derive(Debug, Clone)]
pub struct StartedSession {
    /// The new session's id.
    pub id: SessionId,
    /// Debugger process id.
    pub pid: Option<u32>,
    /// Output captured during the readiness handshake.
    pub banner: String,
}

/// Orchestrates debugger sessions over a shared [`SessionRegistry`].
pub struct SessionLifecycleManager {
    registry: Arc<SessionRegistry>,
    executor: CommandExecutor,
    config: ManagerConfig,
    /// Starts that hold a slot but are not registered yet.
    starting: AtomicUsize,
}

/// A session slot held while a debugger launches. Released on drop.
struct StartSlot<'a> {
    starting: &'a AtomicUsize,
}

impl Drop for StartSlot<'_> {
    fn drop(&mut self) {
        self.starting.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SessionLifecycleManager {
    /// Creates a manager using the prompt marker detector.
    pub fn new(config: ManagerConfig, registry: Arc<SessionRegistry>) -> Self {
        let detector = Arc::new(PromptMarkerDetector::new(
            config.readiness.prompt_marker.clone(),
        ));
        Self::with_detector(config, registry, detector)
    }

    /// Creates a manager with a custom boundary detector.
    pub fn with_detector(
        config: ManagerConfig,
        registry: Arc<SessionRegistry>,
        detector: Arc<dyn BoundaryDetector>,
    ) -> Self {
        let executor = CommandExecutor::new(detector, config.command_timeout)
            .with_idle_settle(config.idle_settle);
        Self {
            registry,
            executor,
            config,
            starting: AtomicUsize::new(0),
        }
    }

    /// The registry this manager works on.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The manager's settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawns a debugger, waits for its prompt and registers the session.
    ///
    /// Nothing is registered on failure, and the child has been killed.
    pub async fn start(&self, options: StartOptions) -> Result<StartedSession, SessionError> {
        let _slot = self.reserve_slot()?;

        let working_dir = match options.working_dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| {
                SessionError::StartFailed(format!("cannot determine working directory: {}", e))
            })?,
        };

        let spec = LaunchSpec {
            executable: options
                .executable
                .unwrap_or_else(|| self.config.executable.clone()),
            args: self.config.args.clone(),
            working_dir: working_dir.clone(),
            env: self.config.env.clone(),
        };

        let id = Uuid::new_v4().to_string();
        tracing::debug!(
            session_id = %id,
            executable = %spec.executable,
            working_dir = %working_dir.display(),
            "Starting debugger session"
        );

        let (process, banner) = launch(&spec, &self.config.readiness)
            .await
            .inspect_err(|e| {
                tracing::warn!(session_id = %id, error = %e, "Debugger failed to start")
            })?;

        let session = Session::new(id.clone(), self.registry.next_seq(), working_dir, process);
        session.mark_ready();
        let pid = session.pid();
        self.registry.insert(session)?;

        tracing::info!(session_id = %id, pid = ?pid, "Started debugger session");

        Ok(StartedSession { id, pid, banner })
    }

    /// Claims room for one more session, counting launches in progress.
    fn reserve_slot(&self) -> Result<StartSlot<'_>, SessionError> {
        let max = self.config.max_sessions;
        self.starting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |starting| {
                (max == 0 || self.registry.len() + starting < max).then_some(starting + 1)
            })
            .map_err(|_| {
                SessionError::StartFailed(format!("maximum number of sessions ({}) reached", max))
            })?;
        Ok(StartSlot {
            starting: &self.starting,
        })
    }

    /// Runs one command on a session.
    pub async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput, SessionError> {
        let session = self.registry.get(id)?;
        let mut process = session.process().lock().await;
        tracing::debug!(session_id = %id, command, "Executing debugger command");
        self.executor.execute(&mut process, command).await
    }

    /// Runs several commands back to back without letting another caller
    /// interleave. Stops at the first error.
    pub async fn execute_all(
        &self,
        id: &str,
        commands: &[String],
    ) -> Result<Vec<CommandOutput>, SessionError> {
        let session = self.registry.get(id)?;
        let mut process = session.process().lock().await;
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            tracing::debug!(session_id = %id, command = %command, "Executing debugger command");
            outputs.push(self.executor.execute(&mut process, command).await?);
        }
        Ok(outputs)
    }

    /// Records the loaded target of a session.
    pub async fn set_target(
        &self,
        id: &str,
        target: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self.registry.get(id)?;
        session.set_target(target).await;
        Ok(())
    }

    /// Looks up a session.
    pub fn session(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.registry.get(id)
    }

    /// Lists sessions in creation order.
    pub async fn list(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.registry.len()
    }

    /// Quits the debugger (best effort), kills it if needed and unregisters
    /// the session.
    pub async fn terminate(&self, id: &str) -> Result<(), SessionError> {
        let session = self.registry.get(id)?;

        {
            let mut process = session.process().lock().await;

            if !process.has_exited() {
                match self
                    .executor
                    .execute_with_timeout(&mut process, QUIT_COMMAND, self.config.shutdown_grace)
                    .await
                {
                    Ok(output) => {
                        tracing::debug!(session_id = %id, output = %output.render(), "Sent quit")
                    }
                    Err(e) => tracing::debug!(session_id = %id, error = %e, "Quit failed"),
                }
            }

            if !process.has_exited() {
                process.kill();
                if process.wait_for_exit(KILL_WAIT).await.is_none() {
                    tracing::warn!(
                        session_id = %id,
                        pid = ?session.pid(),
                        "Debugger did not exit after kill"
                    );
                }
            }
        }

        self.registry.remove(id)?;
        tracing::info!(session_id = %id, "Terminated debugger session");
        Ok(())
    }

    /// Terminates every session. Failures are logged and skipped.
    ///
    /// Returns the number of sessions terminated.
    pub async fn shutdown_all(&self) -> usize {
        let ids = self.registry.ids();
        let mut terminated = 0;

        for id in ids {
            match self.terminate(&id).await {
                Ok(()) => terminated += 1,
                Err(e) => {
                    tracing::warn!(
                        session_id = %id,
                        error = %e,
                        "Failed to terminate session during shutdown"
                    )
                }
            }
        }

        if terminated > 0 {
            tracing::info!(count = terminated, "All debugger sessions terminated");
        }
        terminated
    }

    /// Removes sessions whose debugger has exited.
    ///
    /// Sessions with a command in flight are skipped.
    pub async fn reap(&self) -> Vec<SessionId> {
        let mut reaped = Vec::new();

        for session in self.registry.snapshot() {
            let exited = match session.process().try_lock() {
                Ok(process) => process.has_exited(),
                Err(_) => continue,
            };

            if exited && self.registry.remove(session.id()).is_ok() {
                tracing::info!(session_id = %session.id(), "Cleaned up exited debugger session");
                reaped.push(session.id().clone());
            }
        }

        reaped
    }

    /// Starts a background task that periodically reaps exited sessions.
    pub fn start_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                manager.reap().await;
            }
        })
    }
}

impl std::fmt::Debug for SessionLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycleManager")
            .field("sessions", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testutil::{fast_readiness, FAKE_LLDB};

    fn manager_with(max_sessions: usize) -> SessionLifecycleManager {
        let config = ManagerConfig {
            executable: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), FAKE_LLDB.to_string()],
            readiness: fast_readiness(),
            command_timeout: Duration::from_millis(1000),
            idle_settle: None,
            shutdown_grace: Duration::from_millis(500),
            max_sessions,
            ..ManagerConfig::default()
        };
        SessionLifecycleManager::new(config, Arc::new(SessionRegistry::new()))
    }

    fn start_in_tmp() -> StartOptions {
        StartOptions {
            executable: None,
            working_dir: Some(std::env::temp_dir()),
        }
    }

    #[tokio::test]
    async fn test_start_registers_ready_session() {
        let manager = manager_with(0);
        let started = manager.start(start_in_tmp()).await.unwrap();

        assert!(started.banner.contains("lldb-fake version"));
        let session = manager.session(&started.id).unwrap();
        assert!(session.is_ready());
        assert_eq!(session.working_dir(), std::env::temp_dir());
        assert_eq!(manager.count(), 1);

        manager.terminate(&started.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_failure_registers_nothing() {
        let manager = manager_with(0);
        let result = manager
            .start(StartOptions {
                executable: Some("/definitely/not/lldb".to_string()),
                working_dir: Some(std::env::temp_dir()),
            })
            .await;
        assert!(matches!(result, Err(SessionError::StartFailed(_))));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_max_sessions() {
        let manager = manager_with(1);
        let first = manager.start(start_in_tmp()).await.unwrap();
        let second = manager.start(start_in_tmp()).await;
        assert!(matches!(second, Err(SessionError::StartFailed(msg)) if msg.contains("maximum")));
        assert_eq!(manager.count(), 1);
        manager.terminate(&first.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_max_sessions_under_concurrent_starts() {
        let manager = Arc::new(manager_with(1));

        let starts: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.start(start_in_tmp()).await })
            })
            .collect();

        let mut started = Vec::new();
        for handle in starts {
            if let Ok(session) = handle.await.unwrap() {
                started.push(session.id);
            }
        }
        assert_eq!(started.len(), 1);
        assert_eq!(manager.count(), 1);

        // The slot is free again once the session is gone.
        manager.terminate(&started[0]).await.unwrap();
        let again = manager.start(start_in_tmp()).await.unwrap();
        manager.terminate(&again.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_start_releases_slot() {
        let mut manager = manager_with(1);
        manager.config.executable = "/definitely/not/lldb".to_string();
        assert!(manager.start(start_in_tmp()).await.is_err());

        manager.config.executable = "/bin/sh".to_string();
        let started = manager.start(start_in_tmp()).await.unwrap();
        manager.terminate(&started.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let manager = manager_with(0);
        assert!(matches!(
            manager.execute("missing", "bt").await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.terminate("missing").await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.set_target("missing", "/bin/ls").await,
            Err(SessionError::NotFound(_))
        ));
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_twice() {
        let manager = manager_with(0);
        let started = manager.start(start_in_tmp()).await.unwrap();

        manager.terminate(&started.id).await.unwrap();
        assert!(manager.list().await.is_empty());
        assert!(matches!(
            manager.terminate(&started.id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_target_shows_in_list() {
        let manager = manager_with(0);
        let started = manager.start(start_in_tmp()).await.unwrap();
        manager.set_target(&started.id, "/tmp/prog").await.unwrap();

        let list = manager.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].target, "/tmp/prog");

        manager.terminate(&started.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_commands_are_serialized() {
        let manager = Arc::new(manager_with(0));
        let started = manager.start(start_in_tmp()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = Arc::clone(&manager);
            let id = started.id.clone();
            handles.push(tokio::spawn(async move {
                let command = format!("cmd-{}", i);
                let out = manager.execute(&id, &command).await.unwrap();
                assert_eq!(out.text, format!("out: {}", command));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        manager.terminate(&started.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_all_keeps_order() {
        let manager = manager_with(0);
        let started = manager.start(start_in_tmp()).await.unwrap();

        let outputs = manager
            .execute_all(&started.id, &["frame info".to_string(), "frame variable".to_string()])
            .await
            .unwrap();
        assert_eq!(outputs[0].text, "out: frame info");
        assert_eq!(outputs[1].text, "out: frame variable");

        manager.terminate(&started.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let manager = manager_with(0);
        for _ in 0..3 {
            manager.start(start_in_tmp()).await.unwrap();
        }
        assert_eq!(manager.shutdown_all().await, 3);
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.shutdown_all().await, 0);
    }

    #[tokio::test]
    async fn test_reap_removes_exited_sessions() {
        let manager = manager_with(0);
        let alive = manager.start(start_in_tmp()).await.unwrap();
        let dead = manager.start(start_in_tmp()).await.unwrap();

        {
            let session = manager.session(&dead.id).unwrap();
            let mut process = session.process().lock().await;
            process.kill();
            process.wait_for_exit(KILL_WAIT).await.unwrap();
        }

        let reaped = manager.reap().await;
        assert_eq!(reaped, vec![dead.id.clone()]);
        assert!(manager.session(&alive.id).is_ok());
        assert!(matches!(
            manager.session(&dead.id),
            Err(SessionError::NotFound(_))
        ));

        manager.terminate(&alive.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_after_process_died() {
        let manager = manager_with(0);
        let started = manager.start(start_in_tmp()).await.unwrap();

        let out = manager.execute(&started.id, "die").await.unwrap();
        assert!(out.exit().is_some());

        manager.terminate(&started.id).await.unwrap();
        assert_eq!(manager.count(), 0);
    }
}
