//! Debugger process spawning and the readiness handshake.
//!
//! The debugger runs with three separate pipes rather than a PTY so that
//! stdout and stderr stay distinguishable. One reader task per output stream
//! forwards chunks into a single event channel, and a supervisor task owns
//! the `Child`, publishing its exit status on a watch channel.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::error::SessionError;

/// Buffer size for reading from the debugger's pipes.
const READ_BUFFER_SIZE: usize = 4096;

/// How long to wait for the process to go away after a kill.
pub const KILL_WAIT: Duration = Duration::from_secs(2);

/// Tag prepended to stderr text in the readiness banner.
const STDERR_TAG: &str = "[stderr] ";

/// A chunk of output or a stream failure from the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Bytes read from stdout.
    Stdout(Bytes),
    /// Bytes read from stderr.
    Stderr(Bytes),
    /// A read on one of the pipes failed.
    Failed(String),
}

/// How the debugger process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, if it exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if it was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// What to spawn.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Debugger executable (name resolved via PATH, or a path).
    pub executable: String,
    /// Extra arguments.
    pub args: Vec<String>,
    /// Working directory for the debugger process.
    pub working_dir: PathBuf,
    /// Extra environment variables; the parent environment is inherited.
    pub env: Vec<(String, String)>,
}

/// Parameters of the readiness handshake.
#[derive(Debug, Clone)]
pub struct Readiness {
    /// Command written right after spawn.
    pub probe_command: String,
    /// Text whose appearance in the output means the debugger is ready.
    pub prompt_marker: String,
    /// How often the accumulated output is checked for the marker.
    pub poll_interval: Duration,
    /// Hard limit on the whole handshake.
    pub start_timeout: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            probe_command: "version".to_string(),
            prompt_marker: "(lldb)".to_string(),
            poll_interval: Duration::from_millis(2000),
            start_timeout: Duration::from_millis(10000),
        }
    }
}

/// Owned handle to a running debugger process.
///
/// Dropping the handle kills the process.
pub struct ProcessHandle {
    pid: Option<u32>,
    stdin: ChildStdin,
    events: mpsc::UnboundedReceiver<OutputEvent>,
    exit: watch::Receiver<Option<ExitInfo>>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_reported: bool,
}

impl ProcessHandle {
    /// Spawn the process and start the reader and supervisor tasks.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, SessionError> {
        let mut child = Command::new(&spec.executable)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SessionError::StartFailed(format!(
                    "failed to spawn '{}' in {}: {}",
                    spec.executable,
                    spec.working_dir.display(),
                    e
                ))
            })?;

        let pid = child.id();

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                return Err(SessionError::StartFailed(
                    "debugger pipes were not captured".to_string(),
                ))
            }
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        spawn_reader(stdout, events_tx.clone(), OutputEvent::Stdout, "stdout");
        spawn_reader(stderr, events_tx, OutputEvent::Stderr, "stderr");

        let (exit_tx, exit) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        spawn_supervisor(child, pid, exit_tx, kill_rx);

        tracing::debug!(pid = ?pid, executable = %spec.executable, "Spawned debugger process");

        Ok(Self {
            pid,
            stdin,
            events,
            exit,
            kill_tx: Some(kill_tx),
            exit_reported: false,
        })
    }

    /// Process ID, if the OS reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write `line` followed by a newline and flush.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.stdin.write_all(&data).await?;
        self.stdin.flush().await
    }

    /// Next output event; `None` once both pipes are closed.
    pub async fn recv_event(&mut self) -> Option<OutputEvent> {
        self.events.recv().await
    }

    /// Take every event already queued without waiting.
    pub fn drain_queued(&mut self) -> Vec<OutputEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Collect events until both pipes close or `limit` elapses.
    ///
    /// Used after the process has exited so that output still in flight in
    /// the reader tasks is not lost.
    pub async fn drain_until_closed(&mut self, limit: Duration) -> Vec<OutputEvent> {
        let mut drained = Vec::new();
        let deadline = Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => drained.push(event),
                Ok(None) | Err(_) => break,
            }
        }
        drained
    }

    /// A receiver that observes the exit status.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit.clone()
    }

    /// Exit status, if the process has already exited.
    pub fn try_exit(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    /// Whether the process has exited.
    pub fn has_exited(&self) -> bool {
        self.try_exit().is_some()
    }

    /// Whether an exchange has already reported this process's exit.
    pub fn exit_reported(&self) -> bool {
        self.exit_reported
    }

    /// Record that the exit has been reported to a caller.
    pub fn mark_exit_reported(&mut self) {
        self.exit_reported = true;
    }

    /// Ask the supervisor to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wait up to `limit` for the process to exit.
    pub async fn wait_for_exit(&mut self, limit: Duration) -> Option<ExitInfo> {
        let mut rx = self.exit.clone();
        tokio::time::timeout(limit, wait_exit(&mut rx)).await.ok()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exit", &self.try_exit())
            .field("exit_reported", &self.exit_reported)
            .finish()
    }
}

/// Resolve once the watched process has exited.
///
/// If the supervisor went away without publishing a status, the exit is
/// reported with unknown code and signal.
pub async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> ExitInfo {
    loop {
        if let Some(info) = *rx.borrow_and_update() {
            return info;
        }
        if rx.changed().await.is_err() {
            return (*rx.borrow()).unwrap_or_default();
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<OutputEvent>,
    wrap: fn(Bytes) -> OutputEvent,
    stream: &'static str,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::trace!(stream, "Debugger stream closed");
                    break;
                }
                Ok(n) => {
                    if tx.send(wrap(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(stream, error = %e, "Debugger stream read failed");
                    let _ = tx.send(OutputEvent::Failed(format!("{} read error: {}", stream, e)));
                    break;
                }
            }
        }
    });
}

fn spawn_supervisor(
    mut child: Child,
    pid: Option<u32>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    kill_rx: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        // A dropped sender also lands in the kill branch.
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!(pid = ?pid, error = %e, "Kill failed");
                }
                child.wait().await
            }
        };

        let info = match status {
            Ok(status) => ExitInfo::from_status(status),
            Err(e) => {
                tracing::warn!(pid = ?pid, error = %e, "Failed to wait for debugger process");
                ExitInfo::default()
            }
        };

        tracing::debug!(pid = ?pid, code = ?info.code, signal = ?info.signal, "Debugger process exited");
        let _ = exit_tx.send(Some(info));
    });
}

/// Spawn the debugger and wait until it shows its prompt.
///
/// Returns the handle and the banner (everything printed during the
/// handshake, stderr lines tagged). On failure the child has been killed.
pub async fn launch(
    spec: &LaunchSpec,
    readiness: &Readiness,
) -> Result<(ProcessHandle, String), SessionError> {
    let mut handle = ProcessHandle::spawn(spec)?;

    if let Err(e) = handle.write_line(&readiness.probe_command).await {
        handle.kill();
        return Err(SessionError::StartFailed(format!(
            "failed to write probe command: {}",
            e
        )));
    }

    let deadline = Instant::now() + readiness.start_timeout;
    let mut ticker = tokio::time::interval(readiness.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut exit_rx = handle.exit_watch();
    let mut buffer = String::new();
    let mut streams_open = true;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                handle.kill();
                handle.wait_for_exit(KILL_WAIT).await;
                return Err(SessionError::StartFailed(format!(
                    "debugger did not become ready within {} ms. Output so far:\n{}",
                    readiness.start_timeout.as_millis(),
                    buffer
                )));
            }
            event = handle.recv_event(), if streams_open => match event {
                Some(OutputEvent::Stdout(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Some(OutputEvent::Stderr(chunk)) => {
                    buffer.push_str(STDERR_TAG);
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                Some(OutputEvent::Failed(msg)) => {
                    handle.kill();
                    return Err(SessionError::StartFailed(msg));
                }
                None => streams_open = false,
            },
            _ = ticker.tick() => {
                if buffer.contains(&readiness.prompt_marker) {
                    let discarded = handle.drain_queued().len();
                    tracing::trace!(discarded, "Discarded output left after readiness");
                    return Ok((handle, buffer));
                }
            }
            info = wait_exit(&mut exit_rx) => {
                for event in handle.drain_until_closed(Duration::from_millis(200)).await {
                    match event {
                        OutputEvent::Stdout(chunk) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                        OutputEvent::Stderr(chunk) => {
                            buffer.push_str(STDERR_TAG);
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        OutputEvent::Failed(_) => {}
                    }
                }
                return Err(SessionError::StartFailed(format!(
                    "debugger exited before becoming ready (code: {}). Output:\n{}",
                    info.code.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    buffer
                )));
            }
        }
    }
}
