//! Events forwarded to the client feed.
//!
//! Every event carries an [`Origin`] and a single line of text. The wire text
//! is what ends up after `data: ` in the SSE frame:
//!
//! | Origin    | Wire text            |
//! |-----------|----------------------|
//! | `Stdout`  | `<line>`             |
//! | `Stderr`  | `ERR: <line>`        |
//! | `Control` | `start`, `DONE`, `Error starting command: <message>` |

use std::fmt;

/// First event of every accepted request.
pub const START_MARKER: &str = "start";
/// Terminal event of every accepted request.
pub const DONE_MARKER: &str = "DONE";
/// Prefix applied to standard error lines.
pub const STDERR_PREFIX: &str = "ERR: ";
/// Prefix of the in-band launch failure message.
pub const SPAWN_ERROR_PREFIX: &str = "Error starting command: ";

/// Which stream (or the engine itself) produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Stdout,
    Stderr,
    Control,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Stdout => "stdout",
            Origin::Stderr => "stderr",
            Origin::Control => "control",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarded line or control marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub origin: Origin,
    pub payload: String,
}

impl OutputEvent {
    pub fn line(origin: Origin, payload: impl Into<String>) -> Self {
        Self {
            origin,
            payload: payload.into(),
        }
    }

    pub fn stdout(payload: impl Into<String>) -> Self {
        Self::line(Origin::Stdout, payload)
    }

    pub fn stderr(payload: impl Into<String>) -> Self {
        Self::line(Origin::Stderr, payload)
    }

    pub fn start() -> Self {
        Self::line(Origin::Control, START_MARKER)
    }

    pub fn done() -> Self {
        Self::line(Origin::Control, DONE_MARKER)
    }

    /// In-band report of a process that could not be launched.
    pub fn spawn_failed(error: &impl fmt::Display) -> Self {
        Self::line(Origin::Control, format!("{SPAWN_ERROR_PREFIX}{error}"))
    }

    /// True only for the `DONE` marker.
    pub fn is_terminal(&self) -> bool {
        self.origin == Origin::Control && self.payload == DONE_MARKER
    }

    /// Text carried in the SSE `data:` field.
    pub fn to_wire_text(&self) -> String {
        match self.origin {
            Origin::Stderr => format!("{STDERR_PREFIX}{}", self.payload),
            Origin::Stdout | Origin::Control => self.payload.clone(),
        }
    }
}

impl fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_lines_are_prefixed() {
        assert_eq!(OutputEvent::stderr("boom").to_wire_text(), "ERR: boom");
        assert_eq!(OutputEvent::stdout("hello").to_wire_text(), "hello");
    }

    #[test]
    fn control_markers() {
        assert_eq!(OutputEvent::start().to_wire_text(), "start");
        assert!(OutputEvent::done().is_terminal());
        assert!(!OutputEvent::start().is_terminal());
        // A stdout line that happens to read DONE is not the terminal marker.
        assert!(!OutputEvent::stdout("DONE").is_terminal());
    }

    #[test]
    fn spawn_failure_message() {
        let event = OutputEvent::spawn_failed(&"no such file");
        assert_eq!(event.origin, Origin::Control);
        assert_eq!(event.to_wire_text(), "Error starting command: no such file");
    }
}
