//! # Start options and the native flags bitmask.
//!
//! [`ProcessOptions`] is the caller-facing configuration for one start;
//! [`ProcessFlags`] is the compact bitmask handed across the native boundary
//! (bit values are part of the boundary contract and must not change).

use std::collections::HashMap;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use crate::process::output::StreamData;

/// Stdin disposition for a started process.
#[derive(Debug, Clone, Default)]
pub enum Stdin {
    /// Keep a writable pipe open; feed it via `write_stdin`/`close_stdin`.
    #[default]
    Piped,
    /// Do not open a stdin pipe at all.
    Closed,
    /// Write this payload at startup, then close the stream. The handle's
    /// stdin counts as explicitly closed from the start.
    Data(StreamData),
}

/// Configuration for [`Process::start`](crate::Process::start).
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Stdin disposition, see [`Stdin`].
    pub stdin: Stdin,
    /// Environment for the child, `None` to inherit.
    pub env: Option<HashMap<String, String>>,
    /// Working directory for the child, `None` to inherit.
    pub cwd: Option<PathBuf>,
    /// Whether stdout is read at all. Off means no stdout events and no
    /// buffered stdout in the result.
    pub capture_stdout: bool,
    /// Whether stderr is read at all.
    pub capture_stderr: bool,
    /// Represent chunks as text instead of raw bytes.
    pub text: bool,
    /// Buffer chunks even when a listener is registered for the stream
    /// (opt-in; by default a delivered chunk is not buffered).
    pub buffer_with_listeners: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            stdin: Stdin::Piped,
            env: None,
            cwd: None,
            capture_stdout: true,
            capture_stderr: true,
            text: false,
            buffer_with_listeners: false,
        }
    }
}

impl ProcessOptions {
    /// Sets the stdin disposition.
    #[must_use]
    pub fn with_stdin(mut self, stdin: Stdin) -> Self {
        self.stdin = stdin;
        self
    }

    /// Sets the child environment.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Sets the child working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Enables or disables stdout capture.
    #[must_use]
    pub fn with_capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }

    /// Enables or disables stderr capture.
    #[must_use]
    pub fn with_capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    /// Switches chunk representation to text.
    #[must_use]
    pub fn with_text(mut self, text: bool) -> Self {
        self.text = text;
        self
    }

    /// Buffers chunks even when stream listeners exist.
    #[must_use]
    pub fn with_buffer_with_listeners(mut self, force: bool) -> Self {
        self.buffer_with_listeners = force;
        self
    }

    /// Derives the native flags bitmask from these options.
    pub fn flags(&self) -> ProcessFlags {
        let mut flags = ProcessFlags::NONE;
        if matches!(self.stdin, Stdin::Closed) {
            flags |= ProcessFlags::STDIN_CLOSED;
        }
        if self.capture_stdout {
            flags |= ProcessFlags::CAPTURE_STDOUT;
        }
        if self.capture_stderr {
            flags |= ProcessFlags::CAPTURE_STDERR;
        }
        if self.text {
            flags |= ProcessFlags::TEXT;
        }
        if self.buffer_with_listeners {
            flags |= ProcessFlags::BUFFER_WITH_LISTENERS;
        }
        flags
    }
}

/// Process start flags crossing the native boundary.
///
/// Bit values match the native side and are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessFlags(u32);

impl ProcessFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Do not open a stdin pipe.
    pub const STDIN_CLOSED: Self = Self(0x1);
    /// Read the child's stdout.
    pub const CAPTURE_STDOUT: Self = Self(0x2);
    /// Read the child's stderr.
    pub const CAPTURE_STDERR: Self = Self(0x4);
    /// Deliver chunks as text instead of raw bytes.
    pub const TEXT: Self = Self(0x8);
    /// Buffer chunks even when stream listeners exist.
    pub const BUFFER_WITH_LISTENERS: Self = Self(0x10);

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ProcessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
