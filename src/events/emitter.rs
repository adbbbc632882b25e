//! # Reentrancy-safe typed event emitter.
//!
//! [`EventEmitter`] is a per-owner registry of listeners keyed by an event
//! key `K`, delivering payloads `P` by reference in registration order.
//! Listeners may add, remove, or replace listeners on the same emitter from
//! *inside* their own invocation without corrupting delivery order or
//! skipping/double-firing anyone.
//!
//! ## Architecture
//! ```text
//! emit(key, &payload)
//!     │  lock, depth += 1, unlock
//!     ▼
//! [conn 0] ─► [conn 1] ─► ... ─► [conn N]      (resumed by last visited
//!     │           │                  │          id, lock released around
//!     │           │                  │          each call)
//!     ▼           ▼                  ▼
//! listener()  (cleared: skip)   listener()
//!     │
//!     ▼  lock, depth -= 1
//! depth == 0 && pending_removal → compact cleared slots
//! entry empty                   → drop entry from the map
//! ```
//!
//! ## Rules
//! - While an emit for a key is in progress (`emit_depth > 0`), connections
//!   are never spliced out: `off` clears the listener slot in place and flags
//!   deferred cleanup, so dispatch never observes a shifted index.
//! - Compaction of cleared slots happens only when depth returns to 0.
//! - A `once` listener's slot is cleared *before* it is invoked, so a
//!   reentrant emit cannot fire it twice.
//! - Listeners appended during dispatch are delivered in the same emit
//!   (length is re-read every iteration); listeners prepended during
//!   dispatch land behind the cursor and wait for the next emit. Dispatch
//!   resumes after the last visited connection id, so neither insertion can
//!   double-fire the listener that performed it.
//! - Exactly one listener panic may propagate per emit: the first panic stops
//!   delivery, depth/compaction bookkeeping completes, then the panic is
//!   resumed to the caller.
//! - The internal lock is never held across a listener invocation.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared listener callback.
pub type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Identity of one listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// One listener registration record. A cleared `listener` slot marks a
/// pending removal that has not been compacted yet.
struct Connection<P> {
    id: ListenerId,
    listener: Option<Listener<P>>,
    once: bool,
}

/// Per-key listener list plus dispatch bookkeeping.
struct Entry<P> {
    connections: Vec<Connection<P>>,
    emit_depth: u32,
    pending_removal: bool,
}

impl<P> Entry<P> {
    fn new() -> Self {
        Self {
            connections: Vec::new(),
            emit_depth: 0,
            pending_removal: false,
        }
    }

    fn live_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.listener.is_some())
            .count()
    }
}

/// Typed publish/subscribe emitter with reentrancy-safe dispatch.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use procbus::EventEmitter;
///
/// let emitter: EventEmitter<&'static str, String> = EventEmitter::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = seen.clone();
/// emitter.on("line", move |payload: &String| {
///     sink.lock().unwrap().push(payload.clone());
/// });
///
/// assert!(emitter.emit("line", &"hello".to_string()));
/// assert!(!emitter.emit("other", &"ignored".to_string()));
/// assert_eq!(seen.lock().unwrap().as_slice(), ["hello"]);
/// ```
pub struct EventEmitter<K, P> {
    entries: Mutex<HashMap<K, Entry<P>>>,
    next_id: AtomicU64,
}

impl<K, P> Default for EventEmitter<K, P>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventEmitter<K, P>
where
    K: Copy + Eq + Hash,
{
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<P>>> {
        // The lock is never held across user code, so a poisoned state can
        // only mean an internal panic; the map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, key: K, listener: Listener<P>, once: bool, prepend: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        let conn = Connection {
            id,
            listener: Some(listener),
            once,
        };
        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert_with(Entry::new);
        if prepend {
            entry.connections.insert(0, conn);
        } else {
            entry.connections.push(conn);
        }
        id
    }

    /// Registers a listener, appended to the delivery order.
    pub fn on<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.add(key, Arc::new(listener), false, false)
    }

    /// Registers a listener that auto-removes after its first invocation.
    pub fn once<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.add(key, Arc::new(listener), true, false)
    }

    /// Registers a listener at the front of the delivery order.
    pub fn prepend<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.add(key, Arc::new(listener), false, true)
    }

    /// Registers a one-shot listener at the front of the delivery order.
    pub fn prepend_once<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.add(key, Arc::new(listener), true, true)
    }

    /// Removes a prior registration by identity.
    ///
    /// Returns whether a live registration was found. If dispatch for `key`
    /// is in progress, the slot is cleared in place and compacted once the
    /// dispatch depth returns to zero.
    pub fn off(&self, key: K, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return false;
        };
        let Some(idx) = entry
            .connections
            .iter()
            .position(|c| c.id == id && c.listener.is_some())
        else {
            return false;
        };
        if entry.emit_depth > 0 {
            entry.connections[idx].listener = None;
            entry.pending_removal = true;
        } else {
            entry.connections.remove(idx);
            if entry.connections.is_empty() {
                entries.remove(&key);
            }
        }
        true
    }

    /// Removes every listener for `key`.
    pub fn remove_all(&self, key: K) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        if entry.emit_depth > 0 {
            for conn in &mut entry.connections {
                conn.listener = None;
            }
            entry.pending_removal = true;
        } else {
            entries.remove(&key);
        }
    }

    /// Removes every listener for every key.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.retain(|_, entry| {
            if entry.emit_depth > 0 {
                for conn in &mut entry.connections {
                    conn.listener = None;
                }
                entry.pending_removal = true;
                true
            } else {
                false
            }
        });
    }

    /// Invokes each live listener for `key` in registration order with a
    /// reference to `payload`.
    ///
    /// Returns whether any registration existed for the key. Listeners
    /// removed mid-dispatch are skipped; listeners appended mid-dispatch are
    /// delivered in the same emit. The first listener panic stops delivery
    /// and is resumed after dispatch bookkeeping completes.
    pub fn emit(&self, key: K, payload: &P) -> bool {
        {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return false;
            };
            entry.emit_depth += 1;
        }

        let mut caught: Option<Box<dyn std::any::Any + Send>> = None;
        // Iteration resumes after the last visited connection id, not at a
        // raw index: a prepend from inside a listener shifts the vector, and
        // an index cursor would visit the shifted-right current listener a
        // second time. While depth > 0 connections are cleared in place,
        // never spliced, so a visited id stays findable.
        let mut last_id: Option<ListenerId> = None;
        loop {
            let listener = {
                let mut entries = self.lock();
                let Some(entry) = entries.get_mut(&key) else {
                    break;
                };
                let idx = match last_id {
                    None => 0,
                    Some(id) => match entry.connections.iter().position(|c| c.id == id) {
                        Some(pos) => pos + 1,
                        None => break,
                    },
                };
                if idx >= entry.connections.len() {
                    break;
                }
                let conn = &mut entry.connections[idx];
                last_id = Some(conn.id);
                let listener = conn.listener.clone();
                if listener.is_some() && conn.once {
                    // Cleared before the call so a reentrant emit cannot
                    // fire this listener a second time.
                    conn.listener = None;
                    entry.pending_removal = true;
                }
                listener
            };

            if let Some(f) = listener {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(payload))) {
                    caught = Some(panic);
                    break;
                }
            }
        }

        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(&key) {
                entry.emit_depth -= 1;
                if entry.emit_depth == 0 {
                    if entry.pending_removal {
                        entry.pending_removal = false;
                        entry.connections.retain(|c| c.listener.is_some());
                    }
                    if entry.connections.is_empty() {
                        entries.remove(&key);
                    }
                }
            }
        }

        if let Some(panic) = caught {
            resume_unwind(panic);
        }
        true
    }

    /// Number of live listeners registered for `key`.
    pub fn listener_count(&self, key: K) -> usize {
        self.lock().get(&key).map_or(0, Entry::live_count)
    }

    /// Clones of the live listeners for `key`, in delivery order.
    pub fn listeners(&self, key: K) -> Vec<Listener<P>> {
        self.lock().get(&key).map_or_else(Vec::new, |entry| {
            entry
                .connections
                .iter()
                .filter_map(|c| c.listener.clone())
                .collect()
        })
    }

    /// Keys that currently have a registry entry.
    pub fn event_names(&self) -> Vec<K> {
        self.lock().keys().copied().collect()
    }

    /// Whether any key has a registry entry.
    pub fn has_listeners(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Whether `key` has a registry entry.
    pub fn has_listener(&self, key: K) -> bool {
        self.lock().contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::OnceLock;

    type TestEmitter = EventEmitter<&'static str, u32>;

    fn recorder(
        seen: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl Fn(&u32) + Send + Sync + 'static {
        let seen = seen.clone();
        move |_| seen.lock().unwrap().push(tag)
    }

    #[test]
    fn delivers_in_registration_order() {
        let emitter = TestEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        emitter.on("ev", recorder(&seen, "a"));
        emitter.on("ev", recorder(&seen, "b"));
        emitter.on("ev", recorder(&seen, "c"));

        assert!(emitter.emit("ev", &1));
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "b", "c"]);
    }

    #[test]
    fn prepend_delivers_first() {
        let emitter = TestEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        emitter.on("ev", recorder(&seen, "b"));
        emitter.prepend("ev", recorder(&seen, "a"));

        emitter.emit("ev", &1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "b"]);
    }

    #[test]
    fn emit_without_listeners_returns_false() {
        let emitter = TestEmitter::new();
        assert!(!emitter.emit("ev", &1));
    }

    #[test]
    fn once_fires_exactly_once() {
        let emitter = TestEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        emitter.once("ev", recorder(&seen, "once"));
        emitter.on("ev", recorder(&seen, "on"));

        emitter.emit("ev", &1);
        emitter.emit("ev", &2);
        emitter.emit("ev", &3);
        assert_eq!(seen.lock().unwrap().as_slice(), ["once", "on", "on", "on"]);
    }

    #[test]
    fn off_removes_listener() {
        let emitter = TestEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = emitter.on("ev", recorder(&seen, "a"));
        emitter.on("ev", recorder(&seen, "b"));

        assert!(emitter.off("ev", id));
        assert!(!emitter.off("ev", id));
        emitter.emit("ev", &1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["b"]);
    }

    #[test]
    fn off_during_dispatch_skips_target_without_reordering() {
        let emitter = Arc::new(TestEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());

        // "a" removes "c" while the emit is in flight; "b" must still run
        // and "c" must be skipped in the same emit.
        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            let victim = victim.clone();
            emitter.clone().on("ev", move |_| {
                seen.lock().unwrap().push("a");
                emitter.off("ev", *victim.get().unwrap());
            });
        }
        emitter.on("ev", recorder(&seen, "b"));
        let c = emitter.on("ev", recorder(&seen, "c"));
        victim.set(c).unwrap();

        emitter.emit("ev", &1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "b"]);

        emitter.emit("ev", &2);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "b", "a", "b"]);
    }

    #[test]
    fn listener_removing_itself_never_fires_again() {
        let emitter = Arc::new(TestEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let own: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());

        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            let own_slot = own.clone();
            let id = emitter.clone().on("ev", move |_| {
                seen.lock().unwrap().push("self");
                emitter.off("ev", *own_slot.get().unwrap());
            });
            own.set(id).unwrap();
        }
        emitter.on("ev", recorder(&seen, "other"));

        emitter.emit("ev", &1);
        emitter.emit("ev", &2);
        assert_eq!(seen.lock().unwrap().as_slice(), ["self", "other", "other"]);
    }

    #[test]
    fn listener_prepending_during_dispatch_never_fires_twice() {
        let emitter = Arc::new(TestEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let armed = Arc::new(AtomicBool::new(true));

        // "a" prepends a new listener while its own invocation is on the
        // stack; the insertion shifts the vector front and must not make
        // dispatch visit "a" again in the same emit.
        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            let armed = armed.clone();
            emitter.clone().on("ev", move |_| {
                seen.lock().unwrap().push("a");
                if armed.swap(false, AtomicOrdering::SeqCst) {
                    let inner = seen.clone();
                    emitter.prepend("ev", move |_| inner.lock().unwrap().push("front"));
                }
            });
        }

        emitter.emit("ev", &1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a"]);

        // The prepended listener is at the front for the next emit.
        emitter.emit("ev", &2);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "front", "a"]);
    }

    #[test]
    fn listener_added_during_dispatch_runs_in_same_emit() {
        let emitter = Arc::new(TestEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let emitter = emitter.clone();
            let seen = seen.clone();
            emitter.clone().once("ev", move |_| {
                seen.lock().unwrap().push("adder");
                let inner = seen.clone();
                emitter.on("ev", move |_| inner.lock().unwrap().push("added"));
            });
        }

        emitter.emit("ev", &1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["adder", "added"]);
    }

    #[test]
    fn empty_entries_are_dropped_from_the_map() {
        let emitter = TestEmitter::new();
        let id = emitter.on("ev", |_| {});
        assert!(emitter.has_listener("ev"));

        emitter.off("ev", id);
        assert!(!emitter.has_listener("ev"));
        assert!(!emitter.has_listeners());

        emitter.once("ev", |_| {});
        emitter.emit("ev", &1);
        assert!(!emitter.has_listener("ev"), "fired once entry must be gone");
    }

    #[test]
    fn accessors_filter_cleared_connections() {
        let emitter = TestEmitter::new();
        let id = emitter.on("ev", |_| {});
        emitter.on("ev", |_| {});
        emitter.on("other", |_| {});

        assert_eq!(emitter.listener_count("ev"), 2);
        assert_eq!(emitter.listeners("ev").len(), 2);
        let mut names = emitter.event_names();
        names.sort_unstable();
        assert_eq!(names, ["ev", "other"]);

        emitter.off("ev", id);
        assert_eq!(emitter.listener_count("ev"), 1);
    }

    #[test]
    fn remove_all_drops_key() {
        let emitter = TestEmitter::new();
        emitter.on("ev", |_| {});
        emitter.on("ev", |_| {});
        emitter.remove_all("ev");
        assert!(!emitter.has_listener("ev"));
    }

    #[test]
    fn panic_stops_delivery_but_bookkeeping_completes() {
        let emitter = Arc::new(TestEmitter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let armed = Arc::new(AtomicBool::new(true));

        {
            let seen = seen.clone();
            let armed = armed.clone();
            emitter.once("ev", move |_| {
                seen.lock().unwrap().push("bomb");
                if armed.swap(false, AtomicOrdering::SeqCst) {
                    panic!("listener failure");
                }
            });
        }
        emitter.on("ev", recorder(&seen, "after"));

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| emitter.emit("ev", &1)));
        assert!(result.is_err(), "panic must propagate to the emitter caller");
        assert_eq!(seen.lock().unwrap().as_slice(), ["bomb"]);

        // Depth returned to zero and the fired once was compacted out.
        assert_eq!(emitter.listener_count("ev"), 1);
        emitter.emit("ev", &2);
        assert_eq!(seen.lock().unwrap().as_slice(), ["bomb", "after"]);
    }
}
