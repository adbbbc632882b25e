//! Typed event emitter: listener registry and reentrancy-safe dispatch.
//!
//! ## Contents
//! - [`EventEmitter`] — per-owner listener registry keyed by event key
//! - [`ListenerId`] — registration identity used for removal
//! - [`Listener`] — shared callback type
//!
//! The process handle embeds an `EventEmitter` keyed by
//! [`ProcessEventKind`](crate::ProcessEventKind); the emitter itself is
//! generic and usable on its own.

mod emitter;

pub use emitter::{EventEmitter, Listener, ListenerId};
