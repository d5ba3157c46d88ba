//! Lazy Attribute Slots
//!
//! A `LazyAttribute` holds a value that is fetched on first read and kept on
//! the entity afterwards. Concurrent readers of an attribute that is being
//! loaded wait for that load instead of starting their own.
//!
//! A failed load puts the slot back to `Unloaded` and wakes every waiter;
//! the first waiter to run takes over the load.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::Instant;

/// Observable state of a lazy slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Why `load_until` did not produce a value
#[derive(Debug)]
pub enum LoadError<E> {
    /// The caller's deadline passed while another caller's load was in flight
    TimedOut,
    /// This caller ran the fetch and it failed
    Failed(E),
}

enum Slot<T> {
    Unloaded,
    Loading,
    Loaded(T),
}

/// A deferred per-entity attribute
pub struct LazyAttribute<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for LazyAttribute<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LazyAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LazyAttribute").field(&self.state()).finish()
    }
}

/// Resets the slot to `Unloaded` unless the load completed
struct LoadGuard<'a, T> {
    attr: &'a LazyAttribute<T>,
    done: bool,
}

impl<T> LoadGuard<'_, T> {
    fn complete(mut self, value: T) {
        *self.attr.slot.lock() = Slot::Loaded(value);
        self.done = true;
        self.attr.ready.notify_all();
    }
}

impl<T> Drop for LoadGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            *self.attr.slot.lock() = Slot::Unloaded;
            self.attr.ready.notify_all();
        }
    }
}

impl<T> LazyAttribute<T> {
    /// An unloaded slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Unloaded),
            ready: Condvar::new(),
        }
    }

    /// A slot that is already loaded
    pub fn loaded(value: T) -> Self {
        Self {
            slot: Mutex::new(Slot::Loaded(value)),
            ready: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        match *self.slot.lock() {
            Slot::Unloaded => LoadState::Unloaded,
            Slot::Loading => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Fill an unloaded slot without running a fetch.
    ///
    /// Used when a value arrives through a bulk query. Returns false (and
    /// leaves the slot alone) if the slot is loading or already loaded.
    pub fn set_if_unloaded(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Unloaded) {
            *slot = Slot::Loaded(value);
            self.ready.notify_all();
            true
        } else {
            false
        }
    }
}

/// Outcome of waiting on a slot
enum Claim<'a, T> {
    Ready(T),
    /// The slot was unloaded and is now `Loading`, owned by this guard
    Load(LoadGuard<'a, T>),
}

impl<'a, T: Clone> LoadGuard<'a, T> {
    /// Run `fetch` for the claimed slot; on error the guard drops and
    /// resets it
    fn run<E>(self, fetch: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let value = fetch()?;
        self.complete(value.clone());
        Ok(value)
    }
}

impl<T: Clone> LazyAttribute<T> {
    /// The loaded value, without any I/O
    pub fn get(&self) -> Option<T> {
        match &*self.slot.lock() {
            Slot::Loaded(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Load the value, waiting without a deadline if another caller is
    /// already loading it.
    pub fn load<E, F>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self.claim() {
            Claim::Ready(value) => Ok(value),
            Claim::Load(guard) => guard.run(fetch),
        }
    }

    /// Load the value.
    ///
    /// * loaded: returns a clone, `fetch` is not called
    /// * unloaded: this caller runs `fetch`; success stores the value,
    ///   failure leaves the slot unloaded
    /// * loading: waits for the in-flight load. If `deadline` passes first,
    ///   only this caller gives up; the in-flight load continues.
    pub fn load_until<E, F>(&self, deadline: Option<Instant>, fetch: F) -> Result<T, LoadError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let Some(deadline) = deadline else {
            return self.load(fetch).map_err(LoadError::Failed);
        };
        match self.claim_until(deadline) {
            Some(Claim::Ready(value)) => Ok(value),
            Some(Claim::Load(guard)) => guard.run(fetch).map_err(LoadError::Failed),
            None => Err(LoadError::TimedOut),
        }
    }

    fn claim(&self) -> Claim<'_, T> {
        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                Slot::Loaded(v) => return Claim::Ready(v.clone()),
                Slot::Unloaded => return self.start_loading(&mut slot),
                Slot::Loading => self.ready.wait(&mut slot),
            }
        }
    }

    /// `None` when `deadline` passes while another caller is still loading
    fn claim_until(&self, deadline: Instant) -> Option<Claim<'_, T>> {
        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                Slot::Loaded(v) => return Some(Claim::Ready(v.clone())),
                Slot::Unloaded => return Some(self.start_loading(&mut slot)),
                Slot::Loading => {
                    if self.ready.wait_until(&mut slot, deadline).timed_out()
                        && matches!(*slot, Slot::Loading)
                    {
                        return None;
                    }
                }
            }
        }
    }

    fn start_loading(&self, slot: &mut Slot<T>) -> Claim<'_, T> {
        *slot = Slot::Loading;
        Claim::Load(LoadGuard {
            attr: self,
            done: false,
        })
    }
}
