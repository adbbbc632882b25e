//! # Process handle: the caller-facing side of one external process.
//!
//! A [`Process`] is created against a shared [`ProcessRegistry`], started at
//! most once, and observed either through stream listeners (streaming
//! consumption), through the [`Completion`] returned by `start` (buffered
//! consumption), or both.
//!
//! ```text
//! Process::start(cmd, options)
//!     ├─ tokenize (when given a string)
//!     ├─ NativeLayer::start_process ── Err(text) → Completion fails now
//!     └─ Ok(pid) → pid stored (handle is terminal), Accumulator registered
//!
//! ...native events routed by the registry...
//!
//! Completion ── resolves Ok(ProcessResult)   on exit code 0
//!           └── fails   Err(NonZeroExit{..}) otherwise
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::command::split_command;
use crate::error::ProcessError;
use crate::events::{EventEmitter, ListenerId};
use crate::native::{NativeStartOptions, Pid};
use crate::process::options::{ProcessOptions, Stdin};
use crate::process::output::{ProcessEvent, ProcessEventKind, ProcessResult, StreamData};
use crate::process::registry::ProcessRegistry;

/// Handle state shared with the registry while the process is live.
pub(crate) struct ProcessInner {
    /// Stream and finished listeners for this handle.
    pub(crate) emitter: EventEmitter<ProcessEventKind, ProcessEvent>,
    /// Assigned once by a successful start; never reused by this handle.
    pid: Mutex<Option<Pid>>,
    /// Whether stdin has been explicitly closed.
    stdin_closed: AtomicBool,
}

impl ProcessInner {
    fn new() -> Self {
        Self {
            emitter: EventEmitter::new(),
            pid: Mutex::new(None),
            stdin_closed: AtomicBool::new(false),
        }
    }

    fn lock_pid(&self) -> MutexGuard<'_, Option<Pid>> {
        self.pid.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller-facing handle for one external process instance.
///
/// Cheap to clone; clones share the pid, the stdin state, and the listener
/// registry.
#[derive(Clone)]
pub struct Process {
    registry: Arc<ProcessRegistry>,
    inner: Arc<ProcessInner>,
}

impl Process {
    /// Creates an idle handle bound to `registry`.
    pub fn new(registry: &Arc<ProcessRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
            inner: Arc::new(ProcessInner::new()),
        }
    }

    /// The pid assigned by a successful start, if any.
    pub fn pid(&self) -> Option<Pid> {
        *self.inner.lock_pid()
    }

    /// Tokenizes `command` and starts it. See
    /// [`start_with_args`](Self::start_with_args).
    pub fn start(
        &self,
        command: &str,
        options: ProcessOptions,
    ) -> Result<Completion, ProcessError> {
        let argv = split_command(command)?;
        self.start_with_args(argv, options)
    }

    /// Starts the process with an explicit argument vector.
    ///
    /// Fails with [`ProcessError::AlreadyRunning`] once a pid has been
    /// assigned (a handle is terminal after its first successful start) and
    /// with [`ProcessError::EmptyCommand`] for an empty `argv`. A native
    /// rejection is not a call error: the returned [`Completion`] fails
    /// immediately with [`ProcessError::Launch`] and no pid is stored.
    pub fn start_with_args(
        &self,
        argv: Vec<String>,
        options: ProcessOptions,
    ) -> Result<Completion, ProcessError> {
        let name = argv.first().ok_or(ProcessError::EmptyCommand)?.clone();
        let flags = options.flags();
        let ProcessOptions {
            stdin,
            env,
            cwd,
            buffer_with_listeners,
            ..
        } = options;
        let (stdin_payload, stdin_pre_closed) = match stdin {
            Stdin::Piped => (None, false),
            Stdin::Closed => (None, true),
            Stdin::Data(data) => (Some(data), true),
        };
        let native_options = NativeStartOptions {
            env,
            cwd,
            stdin: stdin_payload,
            flags,
        };

        let (tx, rx) = oneshot::channel();

        // The pid slot stays locked across native acceptance so a racing
        // second start observes either `AlreadyRunning` or its own failure,
        // never a half-started handle.
        let mut pid_slot = self.inner.lock_pid();
        if let Some(pid) = *pid_slot {
            return Err(ProcessError::AlreadyRunning { pid: pid.0 });
        }
        match self.registry.native().start_process(&argv, &native_options) {
            Ok(pid) => {
                self.registry.register(
                    pid,
                    Arc::clone(&self.inner),
                    name,
                    buffer_with_listeners,
                    tx,
                );
                *pid_slot = Some(pid);
                if stdin_pre_closed {
                    self.inner.stdin_closed.store(true, AtomicOrdering::SeqCst);
                }
            }
            Err(reason) => {
                let _ = tx.send(Err(ProcessError::Launch { name, reason }));
            }
        }
        Ok(Completion { rx })
    }

    /// One-shot convenience: create a handle and start `command` on it.
    ///
    /// A failed start is surfaced through the returned completion handle
    /// where possible; tokenization failures are call errors.
    pub fn exec(
        registry: &Arc<ProcessRegistry>,
        command: &str,
        options: ProcessOptions,
    ) -> Result<Completion, ProcessError> {
        Process::new(registry).start(command, options)
    }

    /// Queues `data` for the process stdin.
    ///
    /// Requires an assigned pid ([`ProcessError::NotRunning`]) and an open
    /// stream ([`ProcessError::StdinClosed`]).
    pub fn write_stdin(&self, data: impl Into<StreamData>) -> Result<(), ProcessError> {
        let pid = self.pid().ok_or(ProcessError::NotRunning)?;
        if self.inner.stdin_closed.load(AtomicOrdering::SeqCst) {
            return Err(ProcessError::StdinClosed);
        }
        self.registry.native().write_stdin(pid, &data.into());
        Ok(())
    }

    /// Closes the process stdin, signalling EOF to the child.
    pub fn close_stdin(&self) -> Result<(), ProcessError> {
        let pid = self.pid().ok_or(ProcessError::NotRunning)?;
        if self.inner.stdin_closed.swap(true, AtomicOrdering::SeqCst) {
            return Err(ProcessError::StdinClosed);
        }
        self.registry.native().close_stdin(pid);
        Ok(())
    }

    // --- Event registration surface (delegates to the emitter, §events) ---

    /// Registers a listener for `kind`, appended to the delivery order.
    pub fn on<F>(&self, kind: ProcessEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(kind, listener)
    }

    /// Registers a one-shot listener for `kind`.
    pub fn once<F>(&self, kind: ProcessEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.once(kind, listener)
    }

    /// Registers a listener for `kind` at the front of the delivery order.
    pub fn prepend<F>(&self, kind: ProcessEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.prepend(kind, listener)
    }

    /// Removes a listener registration by identity.
    pub fn off(&self, kind: ProcessEventKind, id: ListenerId) -> bool {
        self.inner.emitter.off(kind, id)
    }

    /// Number of live listeners for `kind`.
    pub fn listener_count(&self, kind: ProcessEventKind) -> usize {
        self.inner.emitter.listener_count(kind)
    }

    /// Whether any registration exists for `kind`.
    pub fn has_listener(&self, kind: ProcessEventKind) -> bool {
        self.inner.emitter.has_listener(kind)
    }
}

/// Asynchronous single-resolution result of one `start`.
///
/// Resolves `Ok(ProcessResult)` on a zero exit code; fails with
/// [`ProcessError::Launch`] on native rejection or
/// [`ProcessError::NonZeroExit`] otherwise. Fulfilled or failed exactly
/// once.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<ProcessResult, ProcessError>>,
}

impl Future for Completion {
    type Output = Result<ProcessResult, ProcessError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ProcessError::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeEvent;
    use crate::process::testing::FakeNative;
    use crate::process::ProcessFlags;

    fn finished(pid: Pid, exit_code: i32) -> NativeEvent {
        NativeEvent::Finished {
            pid,
            exit_code,
            error: None,
        }
    }

    #[tokio::test]
    async fn start_twice_fails_without_disturbing_the_first() {
        let registry = ProcessRegistry::new(FakeNative::new());
        let process = Process::new(&registry);

        let completion = process
            .start("sleep 1", ProcessOptions::default())
            .unwrap();
        let pid = process.pid().unwrap();

        let err = process
            .start("sleep 2", ProcessOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessError::AlreadyRunning { pid: p } if p == pid.0));

        registry.handle_event(finished(pid, 0));
        assert_eq!(completion.await.unwrap().exit_code, 0);
    }

    #[test]
    fn empty_command_is_rejected() {
        let registry = ProcessRegistry::new(FakeNative::new());
        let process = Process::new(&registry);
        let err = process
            .start_with_args(Vec::new(), ProcessOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[test]
    fn malformed_command_surfaces_parse_error() {
        let registry = ProcessRegistry::new(FakeNative::new());
        let process = Process::new(&registry);
        let err = process
            .start("echo \"unterminated", ProcessOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessError::Parse(_)));
    }

    #[tokio::test]
    async fn native_rejection_fails_the_completion_and_stores_no_pid() {
        let registry = ProcessRegistry::new(FakeNative::rejecting("no such executable"));
        let process = Process::new(&registry);

        let completion = process
            .start("missing-tool --help", ProcessOptions::default())
            .unwrap();
        assert_eq!(process.pid(), None);

        let err = completion.await.unwrap_err();
        match err {
            ProcessError::Launch { name, reason } => {
                assert_eq!(name, "missing-tool");
                assert_eq!(reason, "no such executable");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // No pid was stored, so the handle may try again.
        assert!(process.start("missing-tool", ProcessOptions::default()).is_ok());
    }

    #[tokio::test]
    async fn stdin_lifecycle_is_enforced() {
        let native = FakeNative::new();
        let registry = ProcessRegistry::new(native.clone());
        let process = Process::new(&registry);

        assert!(matches!(
            process.write_stdin("early"),
            Err(ProcessError::NotRunning)
        ));
        assert!(matches!(process.close_stdin(), Err(ProcessError::NotRunning)));

        let _completion = process.start("cat", ProcessOptions::default()).unwrap();
        let pid = process.pid().unwrap();

        process.write_stdin("line one\n").unwrap();
        process.close_stdin().unwrap();
        assert!(matches!(
            process.write_stdin("too late"),
            Err(ProcessError::StdinClosed)
        ));
        assert!(matches!(process.close_stdin(), Err(ProcessError::StdinClosed)));

        assert_eq!(
            native.writes.lock().unwrap().as_slice(),
            [(pid, StreamData::Text("line one\n".into()))]
        );
        assert_eq!(native.closes.lock().unwrap().as_slice(), [pid]);
    }

    #[tokio::test]
    async fn initial_stdin_payload_pre_closes_the_stream() {
        let native = FakeNative::new();
        let registry = ProcessRegistry::new(native.clone());
        let process = Process::new(&registry);

        let _completion = process
            .start(
                "wc -l",
                ProcessOptions::default().with_stdin(Stdin::Data("a\nb\n".into())),
            )
            .unwrap();

        assert!(matches!(
            process.write_stdin("more"),
            Err(ProcessError::StdinClosed)
        ));

        let starts = native.starts.lock().unwrap();
        let record = &starts[0];
        assert_eq!(record.argv, ["wc", "-l"]);
        assert_eq!(record.options.stdin, Some(StreamData::Text("a\nb\n".into())));
        assert!(!record.options.flags.contains(ProcessFlags::STDIN_CLOSED));
    }

    #[tokio::test]
    async fn exec_runs_a_command_to_completion() {
        let registry = ProcessRegistry::new(FakeNative::new());
        let completion = Process::exec(
            &registry,
            "true",
            ProcessOptions::default(),
        )
        .unwrap();

        // The fake assigns pids sequentially starting at 1.
        registry.handle_event(finished(Pid(1), 0));
        assert_eq!(completion.await.unwrap().exit_code, 0);
    }
}
