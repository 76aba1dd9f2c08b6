//! Single-fire broadcast signals scoped to one overlay mount.
//!
//! A [`OneShot`] holds at most one value for its whole lifetime. The first
//! [`OneShot::fire`] stores the value and wakes every [`Listener`]; later
//! fires are no-ops. Clones share the same slot.

use std::sync::Arc;
use tokio::sync::watch;

pub struct OneShot<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for OneShot<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + Sync> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> OneShot<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Stores `value` if nothing was fired yet. Returns `true` only for the
    /// call that actually fired.
    pub fn fire(&self, value: T) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = value.take();
            true
        })
    }

    pub fn is_fired(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> Listener<T> {
        Listener {
            rx: self.slot.subscribe(),
        }
    }
}

pub struct Listener<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Listener<T> {
    /// Resolves with the fired value, immediately if it already fired.
    /// Returns `None` if every sender is gone without firing.
    pub async fn wait(&mut self) -> Option<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        }
    }

    pub fn get(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}
