//! Host-side networking hook point.
//!
//! Instead of patching ambient request primitives, the host routes every
//! request through [`NetworkLayer::begin_request`]. Observers registered with
//! [`NetworkLayer::intercept`] see each start and exactly one matching end.

use curtain_core::{NetworkActivityObserver, OverlayError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

struct Registration {
    id: u64,
    observer: Arc<dyn NetworkActivityObserver>,
}

#[derive(Default)]
struct LayerInner {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct NetworkLayer {
    inner: Arc<LayerInner>,
}

impl NetworkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `observer` on top of whatever is already registered.
    ///
    /// Fails when the same observer is already registered or the layer is
    /// poisoned; callers are expected to carry on without network visibility.
    pub fn intercept(
        &self,
        observer: Arc<dyn NetworkActivityObserver>,
    ) -> Result<InterceptHandle, OverlayError> {
        let mut registrations = self.inner.registrations.lock().map_err(|_| {
            OverlayError::interception_error("network layer is poisoned")
        })?;

        if registrations
            .iter()
            .any(|r| Arc::ptr_eq(&r.observer, &observer))
        {
            return Err(OverlayError::interception_error("observer is already registered")
                .with_context(json!({ "registered": registrations.len() })));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        registrations.push(Registration { id, observer });
        tracing::debug!(registration = id, depth = registrations.len(), "network observer registered");

        Ok(InterceptHandle {
            layer: Arc::downgrade(&self.inner),
            id,
            released: AtomicBool::new(false),
        })
    }

    /// Marks the start of one request. The returned scope reports the end
    /// when dropped, to the same observers that saw the start.
    pub fn begin_request(&self) -> RequestScope {
        let observers: Vec<_> = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| Arc::clone(&r.observer))
            .collect();

        for observer in &observers {
            observer.on_request_start();
        }
        RequestScope { observers }
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Restore handle for one registration.
///
/// Releasing removes only this registration, so registrations made by later
/// mounts survive an earlier mount's teardown.
pub struct InterceptHandle {
    layer: Weak<LayerInner>,
    id: u64,
    released: AtomicBool,
}

impl InterceptHandle {
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(layer) = self.layer.upgrade() {
            let mut registrations = layer
                .registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registrations.retain(|r| r.id != self.id);
            tracing::debug!(registration = self.id, depth = registrations.len(), "network observer released");
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for InterceptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for InterceptHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// One tracked request. Dropping it settles the request, whatever the result.
#[must_use = "dropping the scope immediately ends the request"]
pub struct RequestScope {
    observers: Vec<Arc<dyn NetworkActivityObserver>>,
}

impl RequestScope {
    pub fn finish(self) {}
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        for observer in &self.observers {
            observer.on_request_end();
        }
    }
}
