//! # Process lifecycle: handles, options, routing, results.
//!
//! - [`handle`]: the caller-facing [`Process`] and its [`Completion`].
//! - [`options`]: start configuration and the native flags bitmask.
//! - [`output`]: stream data, chunk, event, and result types.
//! - [`registry`]: pid-keyed routing of native notifications.

mod handle;
mod options;
mod output;
mod registry;

pub use handle::{Completion, Process};
pub use options::{ProcessFlags, ProcessOptions, Stdin};
pub use output::{OutputChunk, ProcessEvent, ProcessEventKind, ProcessResult, StreamData};
pub use registry::ProcessRegistry;
