//! One request/response exchange with a debugger process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::boundary::BoundaryDetector;
use super::error::SessionError;
use super::launcher::{wait_exit, ExitInfo, OutputEvent, ProcessHandle};

/// How long to keep collecting output after the process has exited.
const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// A soft outcome attached to an otherwise successful command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// No complete response arrived in time.
    Timeout {
        /// Time waited.
        elapsed: Duration,
        /// The command that was sent.
        command: String,
    },
    /// The debugger exited while the command was in flight.
    Exited(ExitInfo),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Timeout { elapsed, command } => write!(
                f,
                "[Timeout waiting for debugger response after {} seconds for command: {}]",
                elapsed.as_secs_f64(),
                command
            ),
            Annotation::Exited(info) => write!(
                f,
                "[Debugger process exited during command execution. Code: {}, Signal: {}]",
                info.code.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                info.signal.map_or_else(|| "unknown".to_string(), |s| s.to_string())
            ),
        }
    }
}

/// Result of one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Response text (clean when the boundary was detected, raw otherwise).
    pub text: String,
    /// Everything read from stderr during the exchange.
    pub stderr: String,
    /// Soft outcomes.
    pub annotations: Vec<Annotation>,
}

impl CommandOutput {
    /// Whether the response boundary was detected.
    pub fn is_complete(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Whether the exchange ended in a timeout.
    pub fn timed_out(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| matches!(a, Annotation::Timeout { .. }))
    }

    /// Exit status, if the process exited during the exchange.
    pub fn exit(&self) -> Option<ExitInfo> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Exited(info) => Some(*info),
            _ => None,
        })
    }

    /// Caller-visible text: response, tagged stderr, then one line per annotation.
    pub fn render(&self) -> String {
        let mut out = self.text.clone();
        if !self.stderr.is_empty() {
            out.push_str("\n[stderr]:\n");
            out.push_str(&self.stderr);
        }
        for annotation in &self.annotations {
            out.push('\n');
            out.push_str(&annotation.to_string());
        }
        out
    }
}

/// Drives command exchanges using a boundary detector and a timeout.
#[derive(Clone)]
pub struct CommandExecutor {
    detector: Arc<dyn BoundaryDetector>,
    command_timeout: Duration,
    idle_settle: Option<Duration>,
}

impl CommandExecutor {
    /// Create an executor.
    pub fn new(detector: Arc<dyn BoundaryDetector>, command_timeout: Duration) -> Self {
        Self {
            detector,
            command_timeout,
            idle_settle: None,
        }
    }

    /// Consult [`BoundaryDetector::detect_idle`] after this much silence.
    pub fn with_idle_settle(mut self, idle_settle: Option<Duration>) -> Self {
        self.idle_settle = idle_settle;
        self
    }

    /// The default per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Run `command` with the default timeout.
    pub async fn execute(
        &self,
        process: &mut ProcessHandle,
        command: &str,
    ) -> Result<CommandOutput, SessionError> {
        self.execute_with_timeout(process, command, self.command_timeout)
            .await
    }

    /// Run `command`, settling exactly once.
    ///
    /// Timeouts and process exit resolve `Ok` with an annotation. Stream
    /// failures resolve `Err(ProcessError)` with the output collected so far.
    pub async fn execute_with_timeout(
        &self,
        process: &mut ProcessHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, SessionError> {
        check_single_line(command)?;

        if process.exit_reported() {
            return Err(SessionError::ProcessError(format!(
                "debugger process has already exited; cannot run '{}'",
                command
            )));
        }

        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        if let Some(info) = process.try_exit() {
            let queued = process.drain_until_closed(EXIT_DRAIN).await;
            collect(queued, &mut stdout, &mut stderr);
            process.mark_exit_reported();
            return Ok(settle_raw(stdout, stderr, Annotation::Exited(info)));
        }

        let stale = process.drain_queued();
        if !stale.is_empty() {
            tracing::trace!(events = stale.len(), "Discarding stale debugger output");
        }

        process
            .write_line(command)
            .await
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut exit_rx = process.exit_watch();
        let mut streams_open = true;
        let idle = tokio::time::sleep_until(deadline);
        tokio::pin!(idle);
        let mut idle_armed = false;

        loop {
            tokio::select! {
                event = process.recv_event(), if streams_open => match event {
                    Some(OutputEvent::Stdout(chunk)) => {
                        stdout.extend_from_slice(&chunk);
                        let text = String::from_utf8_lossy(&stdout);
                        if let Some(clean) = self.detector.detect(command, &text) {
                            return Ok(CommandOutput {
                                text: clean,
                                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                                annotations: Vec::new(),
                            });
                        }
                        if let Some(settle) = self.idle_settle {
                            idle.as_mut().reset(Instant::now() + settle);
                            idle_armed = true;
                        }
                    }
                    Some(OutputEvent::Stderr(chunk)) => stderr.extend_from_slice(&chunk),
                    Some(OutputEvent::Failed(msg)) => {
                        return Err(SessionError::ProcessError(format!(
                            "{}\nOutput so far:\n{}\nStderr:\n{}",
                            msg,
                            String::from_utf8_lossy(&stdout),
                            String::from_utf8_lossy(&stderr)
                        )));
                    }
                    None => streams_open = false,
                },
                _ = &mut idle, if idle_armed => {
                    idle_armed = false;
                    let text = String::from_utf8_lossy(&stdout);
                    if let Some(clean) = self.detector.detect_idle(command, &text) {
                        return Ok(CommandOutput {
                            text: clean,
                            stderr: String::from_utf8_lossy(&stderr).into_owned(),
                            annotations: Vec::new(),
                        });
                    }
                }
                info = wait_exit(&mut exit_rx) => {
                    let queued = process.drain_until_closed(EXIT_DRAIN).await;
                    collect(queued, &mut stdout, &mut stderr);
                    process.mark_exit_reported();
                    return Ok(settle_raw(stdout, stderr, Annotation::Exited(info)));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(
                        command,
                        timeout_ms = timeout.as_millis() as u64,
                        "Command timed out"
                    );
                    return Ok(settle_raw(
                        stdout,
                        stderr,
                        Annotation::Timeout {
                            elapsed: timeout,
                            command: command.to_string(),
                        },
                    ));
                }
            }
        }
    }
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("command_timeout", &self.command_timeout)
            .field("idle_settle", &self.idle_settle)
            .finish()
    }
}

fn collect(events: Vec<OutputEvent>, stdout: &mut Vec<u8>, stderr: &mut Vec<u8>) {
    for event in events {
        match event {
            OutputEvent::Stdout(chunk) => stdout.extend_from_slice(&chunk),
            OutputEvent::Stderr(chunk) => stderr.extend_from_slice(&chunk),
            OutputEvent::Failed(msg) => tracing::debug!(error = %msg, "Stream failure after exit"),
        }
    }
}

fn settle_raw(stdout: Vec<u8>, stderr: Vec<u8>, annotation: Annotation) -> CommandOutput {
    CommandOutput {
        text: String::from_utf8_lossy(&stdout).trim_end().to_string(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        annotations: vec![annotation],
    }
}

/// The debugger reads one command per line; a second line would be answered
/// after this exchange settles and leak into the next one.
fn check_single_line(command: &str) -> Result<(), SessionError> {
    if command.contains(['\n', '\r']) {
        return Err(SessionError::InvalidCommand(format!(
            "command must be a single line: {:?}",
            command
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::boundary::PromptMarkerDetector;
    use crate::session::testutil::{spawn_fake, FAKE_ECHO_LLDB, FAKE_LLDB};

    fn executor(timeout_ms: u64) -> CommandExecutor {
        CommandExecutor::new(
            Arc::new(PromptMarkerDetector::default()),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_render_plain() {
        let out = CommandOutput {
            text: "hello".to_string(),
            ..Default::default()
        };
        assert_eq!(out.render(), "hello");
        assert!(out.is_complete());
    }

    #[test]
    fn test_render_with_stderr_and_annotations() {
        let out = CommandOutput {
            text: "partial".to_string(),
            stderr: "oops".to_string(),
            annotations: vec![
                Annotation::Timeout {
                    elapsed: Duration::from_secs(10),
                    command: "continue".to_string(),
                },
                Annotation::Exited(ExitInfo {
                    code: Some(3),
                    signal: None,
                }),
            ],
        };
        assert_eq!(
            out.render(),
            "partial\n[stderr]:\noops\n\
             [Timeout waiting for debugger response after 10 seconds for command: continue]\n\
             [Debugger process exited during command execution. Code: 3, Signal: unknown]"
        );
        assert!(out.timed_out());
        assert_eq!(out.exit().and_then(|e| e.code), Some(3));
    }

    #[tokio::test]
    async fn test_execute_complete_response() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let out = executor(2000).execute(&mut process, "print x").await.unwrap();
        assert_eq!(out.text, "out: print x");
        assert!(out.is_complete());
        process.kill();
    }

    #[tokio::test]
    async fn test_execute_collects_stderr() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let out = executor(2000).execute(&mut process, "warn").await.unwrap();
        assert_eq!(out.text, "warned");
        assert_eq!(out.stderr, "problem\n");
        assert!(out.render().contains("[stderr]:\nproblem"));
        process.kill();
    }

    #[tokio::test]
    async fn test_execute_timeout_keeps_partial_output() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let out = executor(300).execute(&mut process, "noprompt").await.unwrap();
        assert!(out.timed_out());
        assert!(out.text.contains("partial output"));
        assert!(out
            .render()
            .contains("[Timeout waiting for debugger response after 0.3 seconds for command: noprompt]"));

        // The session keeps working afterwards.
        let out = executor(2000).execute(&mut process, "next").await.unwrap();
        assert_eq!(out.text, "out: next");
        process.kill();
    }

    #[tokio::test]
    async fn test_execute_exit_then_process_error() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let exec = executor(2000);

        let out = exec.execute(&mut process, "die").await.unwrap();
        assert_eq!(out.exit().and_then(|e| e.code), Some(3));
        assert!(out.text.contains("dying"));
        assert!(out.render().contains("Code: 3, Signal: unknown"));

        let err = exec.execute(&mut process, "bt").await.unwrap_err();
        assert!(matches!(err, SessionError::ProcessError(_)));
    }

    #[tokio::test]
    async fn test_execute_on_silently_dead_process() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        process.kill();
        process.wait_for_exit(Duration::from_secs(2)).await.unwrap();

        let exec = executor(2000);
        let out = exec.execute(&mut process, "bt").await.unwrap();
        assert!(out.exit().is_some());

        let err = exec.execute(&mut process, "bt").await.unwrap_err();
        assert!(matches!(err, SessionError::ProcessError(_)));
    }

    #[tokio::test]
    async fn test_execute_idle_settle_with_leading_echo() {
        let mut process = spawn_fake(FAKE_ECHO_LLDB).await;
        let exec = executor(2000).with_idle_settle(Some(Duration::from_millis(50)));
        let out = exec.execute(&mut process, "bt").await.unwrap();
        assert_eq!(out.text, "out: bt");
        assert!(out.is_complete());
        process.kill();
    }

    #[tokio::test]
    async fn test_multi_line_command_is_rejected() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let exec = executor(2000);

        for command in ["first\nlate", "first\rlate", "trailing\n"] {
            let err = exec.execute(&mut process, command).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidCommand(_)), "{}", err);
        }

        // Nothing was written, so the next exchange sees only its own output.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let out = exec.execute(&mut process, "third").await.unwrap();
        assert_eq!(out.text, "out: third");
        process.kill();
    }

    #[tokio::test]
    async fn test_stale_output_is_discarded() {
        let mut process = spawn_fake(FAKE_LLDB).await;
        let exec = executor(2000);

        let out = exec.execute(&mut process, "late").await.unwrap();
        assert_eq!(out.text, "early");

        // "late noise" arrives after the boundary and must not leak forward.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let out = exec.execute(&mut process, "frame info").await.unwrap();
        assert_eq!(out.text, "out: frame info");
        process.kill();
    }
}
