use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::simulation::id::Id;

/// Tracks which elements (nodes or links) hold work for an upcoming sweep.
///
/// Every element has an atomic flag, indexed by its internal id. Only the caller which flips the
/// flag from inactive to active inserts the element into the pending collection, so that an element
/// is contained at most once, no matter how many threads activate it concurrently.
///
/// The registry is shared via `Arc` between the engine owning the elements and everyone who may
/// activate them, e.g. sibling engines running on other threads.
#[derive(Debug)]
pub struct ActivationRegistry<T> {
    flags: Vec<AtomicBool>,
    pending: Mutex<Vec<Id<T>>>,
}

impl<T> ActivationRegistry<T> {
    pub fn new(size: usize) -> Self {
        ActivationRegistry {
            flags: (0..size).map(|_| AtomicBool::new(false)).collect(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Marks the element as active. Returns true if this call inserted the element, false if it
    /// was active already or if the id does not belong to this registry.
    pub fn activate(&self, id: &Id<T>) -> bool {
        let Some(flag) = self.flags.get(id.index()) else {
            return false;
        };
        if flag.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.pending.lock().push(id.clone());
        true
    }

    pub fn is_active(&self, id: &Id<T>) -> bool {
        self.flags
            .get(id.index())
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Removes all active elements and returns them in ascending order of their internal ids.
    /// Elements activated while the result is processed are collected for the next drain.
    pub fn drain_active(&self) -> Vec<Id<T>> {
        let mut drained = {
            // flags are reset under the lock, so that a concurrent activation either finds its
            // element in this drain or pushes it for the next one
            let mut pending = self.pending.lock();
            for id in pending.iter() {
                self.flags[id.index()].store(false, Ordering::Release);
            }
            std::mem::take(&mut *pending)
        };
        drained.sort_unstable();
        drained
    }

    /// Number of active elements.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Number of elements this registry can track.
    pub fn capacity(&self) -> usize {
        self.flags.len()
    }
}
