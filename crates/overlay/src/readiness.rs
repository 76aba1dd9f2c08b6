use curtain_core::{DocumentState, ImageStatus, OneShot, PageSnapshot};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// First condition keeping the overlay up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
    /// Page carries the wait marker and has not signalled its data yet
    AwaitingPageData,
    ImagesPending { pending: usize },
    FontsLoading,
    DocumentNotReady(DocumentState),
    /// Display floor not reached
    MinimumDisplay,
    RequestsInFlight(usize),
    /// Requests settled but the stability window has not passed
    NetworkSettling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked(Blocker),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Handle a page uses to say its own asynchronous data has arrived.
#[derive(Clone)]
pub struct PageDataNotifier {
    signal: OneShot<()>,
}

impl PageDataNotifier {
    /// Returns `true` only for the first notification of this mount.
    pub fn notify(&self) -> bool {
        let fired = self.signal.fire(());
        if fired {
            tracing::debug!("page data signal received");
        }
        fired
    }

    pub fn is_received(&self) -> bool {
        self.signal.is_fired()
    }
}

pub struct ReadinessEvaluator {
    page_data: OneShot<()>,
    image_error_grace: Duration,
}

impl ReadinessEvaluator {
    pub fn new(image_error_grace: Duration) -> Self {
        Self {
            page_data: OneShot::new(),
            image_error_grace,
        }
    }

    pub fn notifier(&self) -> PageDataNotifier {
        PageDataNotifier {
            signal: self.page_data.clone(),
        }
    }

    /// Runs `callback` once, when the page data signal fires.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn on_explicit_signal<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut listener = self.page_data.subscribe();
        tokio::spawn(async move {
            if listener.wait().await.is_some() {
                callback();
            }
        })
    }

    pub fn is_ready(&self, snapshot: &PageSnapshot, now: Instant) -> bool {
        self.evaluate(snapshot, now).is_ready()
    }

    /// Point-in-time check of the page-side conditions. Network quiet and
    /// the display floor are the sequencer's concern.
    pub fn evaluate(&self, snapshot: &PageSnapshot, now: Instant) -> Readiness {
        if snapshot.waits_for_data && !self.page_data.is_fired() {
            return Readiness::Blocked(Blocker::AwaitingPageData);
        }

        let pending = snapshot
            .images
            .iter()
            .filter(|image| !self.image_settled(image, now))
            .count();
        if pending > 0 {
            return Readiness::Blocked(Blocker::ImagesPending { pending });
        }

        if !snapshot.fonts.is_settled() {
            return Readiness::Blocked(Blocker::FontsLoading);
        }

        if snapshot.document != DocumentState::Complete {
            return Readiness::Blocked(Blocker::DocumentNotReady(snapshot.document));
        }

        Readiness::Ready
    }

    fn image_settled(&self, image: &ImageStatus, now: Instant) -> bool {
        match image {
            ImageStatus::Decoded => true,
            ImageStatus::Pending => false,
            ImageStatus::Broken { since } => {
                now.saturating_duration_since(*since) >= self.image_error_grace
            }
        }
    }
}
