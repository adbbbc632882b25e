//! # Boundary with the native process layer.
//!
//! This core does not create OS processes itself. An embedder provides a
//! [`NativeLayer`] that performs process creation and pipe plumbing, and
//! feeds the resulting notifications back into
//! [`ProcessRegistry::handle_event`](crate::ProcessRegistry::handle_event) —
//! the single process-wide sink (if the native side supports re-registration,
//! the last registration wins).
//!
//! ```text
//! Process::start ──► NativeLayer::start_process ──► Ok(pid) | Err(text)
//!                                                      │
//!                     async lifecycle thereafter       ▼
//! NativeEvent::{Stdout, Stderr, Finished} ──► ProcessRegistry::handle_event
//! ```
//!
//! ## Contract
//! - `start_process` is synchronous acceptance/rejection; the lifecycle is
//!   asynchronous thereafter.
//! - For an accepted pid, zero or more `Stdout`/`Stderr` events arrive,
//!   followed by exactly one `Finished`; nothing arrives for that pid after
//!   `Finished`.
//! - Per stream, an `OutputChunk::End` marker precedes `Finished` when the
//!   stream is captured.
//! - `write_stdin`/`close_stdin` are fire-and-forget.
//! - There is no kill operation at this boundary; callers wanting forced
//!   termination or timeouts must arrange it outside this core.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::process::{OutputChunk, ProcessFlags, StreamData};

/// Identifier assigned by the native layer to an accepted process.
///
/// Unique while the process is live; never reused concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Start parameters handed to the native layer.
#[derive(Debug, Clone, Default)]
pub struct NativeStartOptions {
    /// Environment for the child, `None` to inherit.
    pub env: Option<HashMap<String, String>>,
    /// Working directory for the child, `None` to inherit.
    pub cwd: Option<PathBuf>,
    /// Initial stdin payload; written by the native layer, then the stream
    /// is closed.
    pub stdin: Option<StreamData>,
    /// Capture/representation flags, see [`ProcessFlags`].
    pub flags: ProcessFlags,
}

/// One notification from the native layer.
///
/// A closed set resolved by variant, not by runtime inspection.
#[derive(Debug, Clone)]
pub enum NativeEvent {
    /// A stdout fragment or end-of-stream marker.
    Stdout {
        /// Target process.
        pid: Pid,
        /// Data fragment, or `End` at EOF.
        chunk: OutputChunk,
    },
    /// A stderr fragment or end-of-stream marker.
    Stderr {
        /// Target process.
        pid: Pid,
        /// Data fragment, or `End` at EOF.
        chunk: OutputChunk,
    },
    /// The process exited. Always the last notification for a pid.
    Finished {
        /// Target process.
        pid: Pid,
        /// OS exit code.
        exit_code: i32,
        /// Native diagnostic text, if any.
        error: Option<String>,
    },
}

/// The consumed process-creation boundary.
///
/// Implementations must be callable from whichever context the runtime and
/// its callers run in.
pub trait NativeLayer: Send + Sync {
    /// Starts a process. Synchronous acceptance (`Ok(pid)`) or rejection
    /// (`Err(text)`, e.g. executable not found).
    fn start_process(
        &self,
        argv: &[String],
        options: &NativeStartOptions,
    ) -> Result<Pid, String>;

    /// Queues a write to the process stdin. Fire-and-forget.
    fn write_stdin(&self, pid: Pid, data: &StreamData);

    /// Closes the process stdin (EOF to the child). Fire-and-forget.
    fn close_stdin(&self, pid: Pid);
}
