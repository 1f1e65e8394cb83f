use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Single-slot queue with a latest-wins overwrite policy.
///
/// `put` never blocks: a value that has not been taken yet is replaced and
/// handed back to the producer. `take` waits until a value is present.
#[derive(Debug)]
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> LatestSlot<T> {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Store `value`, returning the stale value it displaced, if any.
    pub fn put(&self, value: T) -> Option<T> {
        let displaced = self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value);
        self.notify.notify_one();
        displaced
    }

    /// Remove the current value without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for and remove the current value.
    pub async fn take(&self) -> T {
        loop {
            if let Some(v) = self.try_take() {
                return v;
            }
            self.notify.notified().await;
        }
    }

    /// True if a value is waiting.
    pub fn is_occupied(&self) -> bool {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
