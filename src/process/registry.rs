//! # Process registry: pid-keyed routing and result accumulation.
//!
//! [`ProcessRegistry`] owns the single process-wide table mapping a [`Pid`]
//! to the bookkeeping state ([`Accumulator`]) of one running process, and is
//! the single point where the native notification stream is demultiplexed.
//!
//! ## Architecture
//! ```text
//! NativeEvent ──► handle_event(ev)
//!                   ├─► Stdout/Stderr(pid, chunk)
//!                   │     ├─ lookup pid ──────────── absent → warn + discard
//!                   │     ├─ emit chunk on the handle's emitter
//!                   │     └─ no listener || force-buffer → append to buffer
//!                   └─► Finished(pid, code, error)
//!                         ├─ remove entry ─────────── absent → warn + discard
//!                         ├─ merge buffers, resolve/fail the completion
//!                         └─ emit Finished on the handle's emitter
//! ```
//!
//! ## Rules
//! - Routing never panics on registry state: an unknown pid (including a
//!   data event racing a just-processed finished) is logged and discarded,
//!   because the native layer cannot be rolled back.
//! - The table lock is never held across a listener invocation or a native
//!   call; buffer appends for a pid serialize against its finalize through
//!   the same lock.
//! - Finalize runs exactly once per pid, before `handle_event` returns.
//! - A listener panic during output routing is re-raised to the caller only
//!   after the chunk has been buffered per policy.

use std::collections::HashMap;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::ProcessError;
use crate::native::{NativeEvent, NativeLayer, Pid};
use crate::process::handle::ProcessInner;
use crate::process::output::{
    OutputChunk, ProcessEvent, ProcessEventKind, ProcessResult, StreamData,
};

pub(crate) type CompletionSender = oneshot::Sender<Result<ProcessResult, ProcessError>>;

/// Per-process buffering and finalization state.
///
/// Created on a successful start, destroyed the moment the finished
/// notification for its pid is processed.
struct Accumulator {
    /// Display name (first argument token), used in diagnostics.
    name: String,
    /// The owning handle's shared state (its event emitter).
    process: Arc<ProcessInner>,
    /// Buffer chunks even when stream listeners exist.
    buffer_with_listeners: bool,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    /// Resolves the completion handle returned by `start`.
    complete: CompletionSender,
}

/// Ordered chunks of one stream, in a single representation.
///
/// Once a stream has seen one representation, all subsequent chunks must
/// match; the final merge copies each chunk exactly once.
enum StreamBuffer {
    Empty,
    Text(Vec<String>),
    Binary(Vec<Vec<u8>>),
}

impl StreamBuffer {
    /// Appends a chunk. Returns `false` on a representation mismatch (the
    /// chunk is not appended).
    fn append(&mut self, data: StreamData) -> bool {
        match (&mut *self, data) {
            (StreamBuffer::Empty, StreamData::Text(s)) => {
                *self = StreamBuffer::Text(vec![s]);
                true
            }
            (StreamBuffer::Empty, StreamData::Binary(b)) => {
                *self = StreamBuffer::Binary(vec![b]);
                true
            }
            (StreamBuffer::Text(parts), StreamData::Text(s)) => {
                parts.push(s);
                true
            }
            (StreamBuffer::Binary(parts), StreamData::Binary(b)) => {
                parts.push(b);
                true
            }
            _ => false,
        }
    }

    /// Merges the buffered chunks into one value, or `None` when nothing was
    /// ever appended.
    fn finish(self) -> Option<StreamData> {
        match self {
            StreamBuffer::Empty => None,
            StreamBuffer::Text(parts) => {
                let mut merged = String::with_capacity(parts.iter().map(String::len).sum());
                for part in parts {
                    merged.push_str(&part);
                }
                Some(StreamData::Text(merged))
            }
            StreamBuffer::Binary(parts) => {
                let mut merged = Vec::with_capacity(parts.iter().map(Vec::len).sum());
                for part in parts {
                    merged.extend_from_slice(&part);
                }
                Some(StreamData::Binary(merged))
            }
        }
    }
}

/// Pid-keyed dispatcher between the native layer and process handles.
///
/// Exposes exactly three operations over its table: register (from a
/// successful start), route ([`handle_event`](Self::handle_event)), and
/// deregister (on finished, internal). No other component reaches the table.
pub struct ProcessRegistry {
    native: Arc<dyn NativeLayer>,
    table: Mutex<HashMap<Pid, Accumulator>>,
}

impl ProcessRegistry {
    /// Creates a registry over the given native layer.
    ///
    /// The embedder must wire [`handle_event`](Self::handle_event) as the
    /// native layer's notification sink.
    pub fn new(native: Arc<dyn NativeLayer>) -> Arc<Self> {
        Arc::new(Self {
            native,
            table: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn native(&self) -> &Arc<dyn NativeLayer> {
        &self.native
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Pid, Accumulator>> {
        // Never held across user code; a poisoned state can only mean an
        // internal panic and the map is still consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers bookkeeping state for an accepted pid.
    pub(crate) fn register(
        &self,
        pid: Pid,
        process: Arc<ProcessInner>,
        name: String,
        buffer_with_listeners: bool,
        complete: CompletionSender,
    ) {
        debug!(%pid, name = %name, "process registered");
        let acc = Accumulator {
            name,
            process,
            buffer_with_listeners,
            stdout: StreamBuffer::Empty,
            stderr: StreamBuffer::Empty,
            complete,
        };
        if self.lock().insert(pid, acc).is_some() {
            // Pids are never reused while live; a collision means the native
            // layer broke that contract.
            error!(%pid, "pid registered twice, replacing stale entry");
        }
    }

    /// Routes one native notification to the owning handle and accumulator.
    ///
    /// The single entry point consumed from the native layer. Never panics
    /// on registry state; a listener panic is re-raised after buffering and
    /// bookkeeping complete.
    pub fn handle_event(&self, event: NativeEvent) {
        match event {
            NativeEvent::Stdout { pid, chunk } => {
                self.route_output(pid, ProcessEventKind::Stdout, chunk);
            }
            NativeEvent::Stderr { pid, chunk } => {
                self.route_output(pid, ProcessEventKind::Stderr, chunk);
            }
            NativeEvent::Finished {
                pid,
                exit_code,
                error,
            } => {
                self.finish(pid, exit_code, error);
            }
        }
    }

    /// Publishes a chunk to stream listeners, then buffers it when the
    /// delivery policy says so: no listener registered at emission time, or
    /// the force-buffer flag set.
    fn route_output(&self, pid: Pid, stream: ProcessEventKind, chunk: OutputChunk) {
        let (process, force_buffer) = {
            let table = self.lock();
            match table.get(&pid) {
                Some(acc) => (Arc::clone(&acc.process), acc.buffer_with_listeners),
                None => {
                    warn!(%pid, ?stream, "notification for unknown process id, discarding");
                    return;
                }
            }
        };

        let payload = if stream == ProcessEventKind::Stdout {
            ProcessEvent::Stdout(chunk.clone())
        } else {
            ProcessEvent::Stderr(chunk.clone())
        };
        let (had_listeners, panic) =
            match catch_unwind(AssertUnwindSafe(|| process.emitter.emit(stream, &payload))) {
                Ok(had) => (had, None),
                Err(panic) => (true, Some(panic)),
            };

        if let OutputChunk::Data(data) = chunk {
            if !had_listeners || force_buffer {
                let mut table = self.lock();
                match table.get_mut(&pid) {
                    Some(acc) => {
                        let buffer = if stream == ProcessEventKind::Stdout {
                            &mut acc.stdout
                        } else {
                            &mut acc.stderr
                        };
                        if !buffer.append(data) {
                            error!(
                                %pid, ?stream,
                                "text/binary representation mixed on one stream, chunk dropped"
                            );
                        }
                    }
                    // Finished raced us between emit and append: same as an
                    // unknown pid, not an error.
                    None => warn!(%pid, ?stream, "process finished during routing, chunk dropped"),
                }
            }
        }

        if let Some(panic) = panic {
            resume_unwind(panic);
        }
    }

    /// Deregisters the pid and finalizes: merges buffers, resolves or fails
    /// the completion handle, then emits the finished event on the handle.
    fn finish(&self, pid: Pid, exit_code: i32, error: Option<String>) {
        let Some(acc) = self.lock().remove(&pid) else {
            warn!(%pid, "finished notification for unknown process id, discarding");
            return;
        };
        let Accumulator {
            name,
            process,
            stdout,
            stderr,
            complete,
            ..
        } = acc;

        let result = ProcessResult {
            exit_code,
            error,
            stdout: stdout.finish(),
            stderr: stderr.finish(),
        };
        let outcome = if exit_code == 0 {
            Ok(result.clone())
        } else {
            Err(ProcessError::NonZeroExit {
                name: name.clone(),
                exit_code,
                error: result.error.clone(),
            })
        };
        if complete.send(outcome).is_err() {
            debug!(%pid, name = %name, "completion handle dropped before finish");
        }
        debug!(%pid, name = %name, exit_code, "process finalized");

        process
            .emitter
            .emit(ProcessEventKind::Finished, &ProcessEvent::Finished(result));
    }
}
