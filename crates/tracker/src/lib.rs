use curtain_core::{NetworkActivityObserver, OverlayError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub mod client;
pub mod layer;

pub use client::TrackedClient;
pub use layer::{InterceptHandle, NetworkLayer, RequestScope};

/// Live view of unfinished network work for one overlay mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCounter {
    pub in_flight: usize,
    /// Last start or settlement; `None` until the first request
    pub last_activity_at: Option<Instant>,
}

impl ActivityCounter {
    /// No request in flight and nothing observed for at least `window`.
    pub fn is_quiet(&self, now: Instant, window: Duration) -> bool {
        self.in_flight == 0
            && self
                .last_activity_at
                .is_none_or(|at| now.saturating_duration_since(at) >= window)
    }
}

#[derive(Debug, Default)]
pub struct ActivityTracker {
    counter: Mutex<ActivityCounter>,
}

impl ActivityTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn counter(&self) -> MutexGuard<'_, ActivityCounter> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ActivityCounter {
        *self.counter()
    }

    pub fn in_flight(&self) -> usize {
        self.counter().in_flight
    }

    pub fn is_quiet(&self, now: Instant, window: Duration) -> bool {
        self.counter().is_quiet(now, window)
    }

    /// Registers this tracker with the host networking layer. The returned
    /// handle restores the layer when released or dropped.
    pub fn begin_intercepting(
        self: &Arc<Self>,
        layer: &NetworkLayer,
    ) -> Result<InterceptHandle, OverlayError> {
        let observer: Arc<dyn NetworkActivityObserver> = self.clone();
        layer.intercept(observer)
    }

    /// Unregisters regardless of in-flight requests. Safe to call repeatedly;
    /// returns `true` only for the call that actually restored the layer.
    pub fn end_intercepting(handle: &InterceptHandle) -> bool {
        handle.release()
    }
}

impl NetworkActivityObserver for ActivityTracker {
    fn on_request_start(&self) {
        let mut counter = self.counter();
        counter.in_flight += 1;
        counter.last_activity_at = Some(Instant::now());
    }

    fn on_request_end(&self) {
        let mut counter = self.counter();
        match counter.in_flight.checked_sub(1) {
            Some(n) => counter.in_flight = n,
            None => tracing::warn!("request end without matching start"),
        }
        counter.last_activity_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_start_and_end() {
        let tracker = ActivityTracker::new();
        tracker.on_request_start();
        tracker.on_request_start();
        assert_eq!(tracker.in_flight(), 2);

        tracker.on_request_end();
        tracker.on_request_end();
        assert_eq!(tracker.in_flight(), 0);

        tracker.on_request_end();
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_only_after_window() {
        let tracker = ActivityTracker::new();
        let window = Duration::from_millis(300);
        assert!(tracker.is_quiet(Instant::now(), window));

        tracker.on_request_start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!tracker.is_quiet(Instant::now(), window));

        tracker.on_request_end();
        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(!tracker.is_quiet(Instant::now(), window));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(tracker.is_quiet(Instant::now(), window));
    }

    #[tokio::test]
    async fn intercepting_twice_is_rejected() {
        let layer = NetworkLayer::new();
        let tracker = ActivityTracker::new();
        let handle = tracker.begin_intercepting(&layer).unwrap();

        let err = tracker.begin_intercepting(&layer).unwrap_err();
        assert_eq!(err.category, curtain_core::ErrorCategory::Interception);
        assert_eq!(layer.observer_count(), 1);

        assert!(ActivityTracker::end_intercepting(&handle));
        assert!(!ActivityTracker::end_intercepting(&handle));
        assert_eq!(layer.observer_count(), 0);
    }
}
