//! Error types used by the process runtime and the command tokenizer.
//!
//! This module defines two main error enums:
//!
//! - [`ProcessError`] — errors raised by the process lifecycle (handle misuse,
//!   launch rejection, non-zero exit).
//! - [`ParseError`] — errors raised while tokenizing a command line.
//!
//! Both types provide `as_label` helpers returning short stable labels for
//! logging/metrics.

use thiserror::Error;

/// # Errors produced while tokenizing a command line.
///
/// The tokenizer is permissive (shell-like) and only fails when a quoted
/// region is never terminated.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A double-quoted region was opened but never closed.
    #[error("unterminated quote in command: {fragment}")]
    UnterminatedQuote {
        /// The offending fragment, starting at the opening quote.
        fragment: String,
    },
}

impl ParseError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ParseError::UnterminatedQuote { .. } => "parse_unterminated_quote",
        }
    }
}

/// # Errors produced by the process lifecycle.
///
/// Handle-misuse errors (`AlreadyRunning`, `NotRunning`, `StdinClosed`,
/// `EmptyCommand`) are local failures of the call that caused them.
/// `Launch` and `NonZeroExit` are surfaced through the completion handle
/// returned by `start`, never as call errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// `start` was called on a handle that already has an assigned pid.
    #[error("process is already running (pid {pid})")]
    AlreadyRunning {
        /// The pid assigned by the earlier, still-authoritative start.
        pid: u32,
    },

    /// A stdin operation was attempted before a pid was assigned.
    #[error("process is not running")]
    NotRunning,

    /// A stdin operation was attempted after the stream was closed.
    #[error("stdin is already closed")]
    StdinClosed,

    /// `start` was given an empty argument list.
    #[error("empty command")]
    EmptyCommand,

    /// The command string could not be tokenized.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The native layer refused to start the process.
    #[error("failed to launch {name}: {reason}")]
    Launch {
        /// Display name (first argument token).
        name: String,
        /// Error text reported by the native layer.
        reason: String,
    },

    /// The process ran and exited with a non-zero exit code.
    #[error("process {name} exited with exit code {exit_code}{}", exit_detail(.error))]
    NonZeroExit {
        /// Display name (first argument token).
        name: String,
        /// The non-zero exit code.
        exit_code: i32,
        /// Error text reported by the native layer, if any.
        error: Option<String>,
    },

    /// The registry was dropped before the process finished.
    #[error("process registry dropped before completion")]
    Disconnected,
}

fn exit_detail(error: &Option<String>) -> String {
    match error {
        Some(text) => format!("\n{text}"),
        None => String::new(),
    }
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procbus::ProcessError;
    ///
    /// let err = ProcessError::NotRunning;
    /// assert_eq!(err.as_label(), "process_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::AlreadyRunning { .. } => "process_already_running",
            ProcessError::NotRunning => "process_not_running",
            ProcessError::StdinClosed => "process_stdin_closed",
            ProcessError::EmptyCommand => "process_empty_command",
            ProcessError::Parse(e) => e.as_label(),
            ProcessError::Launch { .. } => "process_launch_failed",
            ProcessError::NonZeroExit { .. } => "process_non_zero_exit",
            ProcessError::Disconnected => "process_disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_message_includes_name_code_and_error() {
        let err = ProcessError::NonZeroExit {
            name: "mytool".into(),
            exit_code: 2,
            error: Some("boom".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("mytool"), "missing name: {msg}");
        assert!(msg.contains('2'), "missing exit code: {msg}");
        assert!(msg.contains("boom"), "missing error text: {msg}");
    }

    #[test]
    fn non_zero_exit_message_without_error_text() {
        let err = ProcessError::NonZeroExit {
            name: "mytool".into(),
            exit_code: 1,
            error: None,
        };
        assert_eq!(err.to_string(), "process mytool exited with exit code 1");
    }

    #[test]
    fn parse_error_names_fragment() {
        let err = ParseError::UnterminatedQuote {
            fragment: "\"oops".into(),
        };
        assert!(err.to_string().contains("\"oops"));
    }
}
