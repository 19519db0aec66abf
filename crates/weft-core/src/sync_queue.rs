//! Callbacks for synchronous-lane work, drained from a microtask or on demand.

use std::cell::{Cell, RefCell};

use crate::error::ReconcileError;

type SyncCallback = Box<dyn FnOnce() -> Result<(), ReconcileError>>;

#[derive(Default)]
pub(crate) struct SyncQueue {
    callbacks: RefCell<Vec<SyncCallback>>,
    flushing: Cell<bool>,
}

impl SyncQueue {
    pub(crate) fn push(&self, callback: SyncCallback) {
        self.callbacks.borrow_mut().push(callback);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Runs queued callbacks, including ones queued while flushing. A nested
    /// call returns at once; the outer flush picks up the new entries.
    ///
    /// Every callback runs even when an earlier one fails; the first error is
    /// returned.
    pub(crate) fn flush(&self) -> Result<(), ReconcileError> {
        if self.flushing.replace(true) {
            return Ok(());
        }
        let mut first_error = None;
        loop {
            let batch = std::mem::take(&mut *self.callbacks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for callback in batch {
                if let Err(err) = callback() {
                    first_error.get_or_insert(err);
                }
            }
        }
        self.flushing.set(false);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
