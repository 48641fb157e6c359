//! Response boundary detection.
//!
//! The debugger has no request framing: a command's output simply stops and
//! the prompt is printed again. A [`BoundaryDetector`] looks at the output
//! accumulated so far for one command and decides whether it is complete.

/// Decides whether accumulated output holds a complete response.
pub trait BoundaryDetector: Send + Sync {
    /// Returns the clean response once `buffer` contains a complete reply to
    /// `command`, or `None` if more output is needed.
    fn detect(&self, command: &str, buffer: &str) -> Option<String>;

    /// Called when no output has arrived for a while and [`detect`] still
    /// reports the response as incomplete. Returns the clean response if the
    /// quiet buffer can be taken as complete.
    ///
    /// [`detect`]: BoundaryDetector::detect
    fn detect_idle(&self, command: &str, buffer: &str) -> Option<String> {
        let _ = (command, buffer);
        None
    }
}

/// Detects completion by the reappearance of the prompt marker.
///
/// Echoed input is removed first: when the first complete line is the
/// command itself (optionally prefixed by the marker) it is dropped. The
/// first occurrence of the marker in what remains ends the response. A
/// buffer holding only part of the echo is incomplete; a bare marker is an
/// empty response.
///
/// LLDB reading from a pipe prints `(lldb) <command>` ahead of the output and
/// no prompt after it. For that shape, [`BoundaryDetector::detect_idle`]
/// accepts a quiet buffer whose first line is the prompted echo.
///
/// A program under debug that prints the marker text ends the response
/// early. The remainder is then discarded as stale output before the next
/// command.
#[derive(Debug, Clone)]
pub struct PromptMarkerDetector {
    marker: String,
}

impl PromptMarkerDetector {
    /// Create a detector for `marker`, e.g. `(lldb)`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// The prompt marker.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn prompted(&self, command: &str) -> String {
        format!("{} {}", self.marker, command)
    }

    fn is_echo(&self, line: &str, command: &str) -> bool {
        let line = line.trim();
        let command = command.trim();
        line == command
            || line == self.prompted(command)
            || line == format!("{}{}", self.marker, command)
    }
}

impl Default for PromptMarkerDetector {
    fn default() -> Self {
        Self::new("(lldb)")
    }
}

impl BoundaryDetector for PromptMarkerDetector {
    fn detect(&self, command: &str, buffer: &str) -> Option<String> {
        let body = match buffer.find('\n') {
            None => {
                let partial = buffer.trim_start();
                let partial_echo = command.starts_with(partial)
                    || (self.prompted(command).starts_with(partial)
                        && partial.trim_end().len() > self.marker.len());
                if !partial.is_empty() && partial_echo {
                    return None;
                }
                buffer
            }
            Some(idx) => {
                let first = &buffer[..idx];
                if self.is_echo(first, command) {
                    &buffer[idx + 1..]
                } else {
                    buffer
                }
            }
        };

        let end = body.find(&self.marker)?;
        Some(body[..end].trim_end().to_string())
    }

    fn detect_idle(&self, command: &str, buffer: &str) -> Option<String> {
        let (first, rest) = buffer.split_once('\n')?;
        let first = first.trim();
        if first.starts_with(&self.marker) && self.is_echo(first, command) {
            Some(rest.trim_end().to_string())
        } else {
            None
        }
    }
}
