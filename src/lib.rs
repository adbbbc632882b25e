//! # procbus
//!
//! **Procbus** is an asynchronous external-process execution core for Rust.
//!
//! It multiplexes a single native notification channel across any number of
//! concurrent process handles, lets callers consume output as a stream
//! (listeners), as one buffered result (the completion handle), or both, and
//! ships a standalone reentrancy-safe typed event emitter. Actual OS process
//! creation is delegated to an embedder-provided [`NativeLayer`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │   Process    │   │   Process    │   │   Process    │
//!   │  (handle #1) │   │  (handle #2) │   │  (handle #3) │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          │ start            │ start            │ start
//!          ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ProcessRegistry                                            │
//! │  - table: pid ─► accumulator (buffers + completion sender)  │
//! │  - handle_event(): the single native notification sink      │
//! └──────┬──────────────────────────────────────────────▲───────┘
//!        │ start_process / write_stdin / close_stdin    │
//!        ▼                                              │
//! ┌─────────────────────────────────────────────────────┴───────┐
//! │  NativeLayer (embedder-provided)                            │
//! │  NativeEvent::{Stdout, Stderr, Finished}  keyed by pid      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Process::start(cmd, options)
//!   ├─► split_command(cmd)                 ─ Err ► ProcessError::Parse
//!   ├─► NativeLayer::start_process(argv)   ─ Err ► Completion fails (Launch)
//!   └─► Ok(pid): pid stored, accumulator registered
//!
//! per NativeEvent for that pid:
//!   ├─ Stdout/Stderr(chunk)
//!   │    ├─ emit on the handle's listeners
//!   │    └─ no listener || force-buffer ─► append to the stream buffer
//!   └─ Finished(exit_code, error)          (exactly once, always last)
//!        ├─ merge buffers into ProcessResult
//!        ├─ exit_code == 0 ─► Completion resolves Ok(result)
//!        │  otherwise      ─► Completion fails Err(NonZeroExit)
//!        └─ emit Finished on the handle's listeners
//! ```
//!
//! ## Features
//! | Area             | Description                                                     | Key types / traits                        |
//! |------------------|-----------------------------------------------------------------|-------------------------------------------|
//! | **Handles**      | Start, feed stdin, observe one external process.                | [`Process`], [`Completion`]               |
//! | **Routing**      | Pid-keyed demultiplexing of the native notification stream.     | [`ProcessRegistry`], [`NativeEvent`]      |
//! | **Emitter**      | Typed pub/sub safe under reentrant mutation during dispatch.    | [`EventEmitter`], [`ListenerId`]          |
//! | **Output**       | Text-or-binary chunks, end markers, merged results.             | [`StreamData`], [`OutputChunk`], [`ProcessResult`] |
//! | **Tokenizing**   | Command-line splitting honoring double quotes.                  | [`split_command`], [`join_command`]       |
//! | **Errors**       | Typed errors for parsing and the process lifecycle.             | [`ParseError`], [`ProcessError`]          |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use procbus::{
//!     NativeEvent, NativeLayer, NativeStartOptions, OutputChunk, Pid, Process,
//!     ProcessOptions, ProcessRegistry, StreamData,
//! };
//!
//! // A scripted stand-in for the embedder's real process layer.
//! struct Scripted;
//!
//! impl NativeLayer for Scripted {
//!     fn start_process(
//!         &self,
//!         _argv: &[String],
//!         _options: &NativeStartOptions,
//!     ) -> Result<Pid, String> {
//!         Ok(Pid(7))
//!     }
//!     fn write_stdin(&self, _pid: Pid, _data: &StreamData) {}
//!     fn close_stdin(&self, _pid: Pid) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ProcessRegistry::new(Arc::new(Scripted));
//!
//!     let process = Process::new(&registry);
//!     let completion = process.start("echo \"hello world\"", ProcessOptions::default().with_text(true))?;
//!     let pid = process.pid().unwrap();
//!
//!     // In production the native layer feeds these from its event loop.
//!     registry.handle_event(NativeEvent::Stdout {
//!         pid,
//!         chunk: OutputChunk::Data(StreamData::Text("hello world\n".into())),
//!     });
//!     registry.handle_event(NativeEvent::Stdout { pid, chunk: OutputChunk::End });
//!     registry.handle_event(NativeEvent::Finished { pid, exit_code: 0, error: None });
//!
//!     let result = completion.await?;
//!     assert_eq!(result.stdout, Some(StreamData::Text("hello world\n".into())));
//!     Ok(())
//! }
//! ```
mod command;
mod error;
mod events;
mod native;
mod process;

// ---- Public re-exports ----

pub use command::{join_command, split_command};
pub use error::{ParseError, ProcessError};
pub use events::{EventEmitter, Listener, ListenerId};
pub use native::{NativeEvent, NativeLayer, NativeStartOptions, Pid};
pub use process::{
    Completion, OutputChunk, Process, ProcessEvent, ProcessEventKind, ProcessFlags,
    ProcessOptions, ProcessRegistry, ProcessResult, Stdin, StreamData,
};
