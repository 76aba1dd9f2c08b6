//! Completion state machine for one overlay mount.
//!
//! Two independently scheduled tasks race to end the polling phase: the
//! poll loop (readiness verdict) and the max-wait watchdog. Whichever moves
//! the state out of `AnimatingPolling` first owns the fade; the loser backs
//! off. `Completed` and `Cancelled` are both only reachable through a single
//! locked transition, so completion is broadcast at most once and never
//! after an unmount.

use crate::animation::AnimationLoop;
use crate::readiness::{Blocker, Readiness, ReadinessEvaluator};
use crate::render::FrameRenderer;
use crate::shared::{OverlayConfig, TimingConfig};
use curtain_core::{
    CompletionReport, OneShot, OrchestratorState, Outcome, PageProbe, PageSnapshot, Trigger,
};
use curtain_tracker::{ActivityTracker, InterceptHandle, NetworkLayer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use uuid::Uuid;

pub(crate) type CompletionCallback = Box<dyn FnOnce(&CompletionReport) + Send>;

/// Closes once; only the closing call gets `true`.
#[derive(Debug, Default)]
pub(crate) struct Latch(AtomicBool);

impl Latch {
    pub(crate) fn try_close(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SequencerParts {
    pub config: OverlayConfig,
    pub probe: Arc<dyn PageProbe>,
    pub renderer: Arc<dyn FrameRenderer>,
    pub network: Option<NetworkLayer>,
    pub on_complete: CompletionCallback,
}

pub(crate) struct Sequencer {
    pub(crate) instance: Uuid,
    timing: TimingConfig,
    started_at: Instant,
    state: Mutex<OrchestratorState>,
    trigger: Mutex<Option<Trigger>>,
    teardown: Latch,
    on_complete: Mutex<Option<CompletionCallback>>,
    pub(crate) completion: OneShot<CompletionReport>,
    pub(crate) outcome: OneShot<Outcome>,
    pub(crate) evaluator: ReadinessEvaluator,
    probe: Arc<dyn PageProbe>,
    renderer: Arc<dyn FrameRenderer>,
    animation: AnimationLoop,
    activity: Option<Arc<ActivityTracker>>,
    intercept: Mutex<Option<InterceptHandle>>,
}

impl Sequencer {
    /// Builds the sequencer in `Initializing`: interception registered and
    /// the animation loop already running.
    pub(crate) fn new(parts: SequencerParts) -> Self {
        let instance = Uuid::new_v4();
        let SequencerParts {
            config,
            probe,
            renderer,
            network,
            on_complete,
        } = parts;

        let (activity, intercept) = match network {
            Some(layer) => {
                let tracker = ActivityTracker::new();
                match tracker.begin_intercepting(&layer) {
                    Ok(handle) => (Some(tracker), Some(handle)),
                    Err(e) => {
                        tracing::warn!(%instance, error = %e, "network interception unavailable, relying on page signals");
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        let animation = AnimationLoop::start(
            Arc::clone(&renderer),
            config.animation.clone(),
            config.timing.regen_period,
        );

        Self {
            instance,
            evaluator: ReadinessEvaluator::new(config.timing.image_error_grace),
            timing: config.timing,
            started_at: Instant::now(),
            state: Mutex::new(OrchestratorState::Initializing),
            trigger: Mutex::new(None),
            teardown: Latch::default(),
            on_complete: Mutex::new(Some(on_complete)),
            completion: OneShot::new(),
            outcome: OneShot::new(),
            probe,
            renderer,
            animation,
            activity,
            intercept: Mutex::new(intercept),
        }
    }

    /// Enters `AnimatingPolling` and spawns the poll loop and the watchdog.
    pub(crate) fn start(self: &Arc<Self>) {
        if !self.advance(OrchestratorState::Initializing, OrchestratorState::AnimatingPolling) {
            return;
        }
        tokio::spawn(Arc::clone(self).poll_loop());
        tokio::spawn(Arc::clone(self).watchdog());
    }

    pub(crate) fn state(&self) -> OrchestratorState {
        *lock(&self.state)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn advance(&self, from: OrchestratorState, to: OrchestratorState) -> bool {
        let mut state = lock(&self.state);
        if *state != from || !from.can_advance_to(to) {
            return false;
        }
        *state = to;
        tracing::debug!(instance = %self.instance, %from, %to, "overlay state changed");
        true
    }

    /// Leaves the polling phase. Only the first caller gets `true` and must
    /// then run [`Sequencer::fade_and_complete`].
    pub(crate) fn trigger(&self, trigger: Trigger) -> bool {
        if !self.advance(OrchestratorState::AnimatingPolling, OrchestratorState::Stabilizing) {
            return false;
        }
        *lock(&self.trigger) = Some(trigger);
        match trigger {
            Trigger::Ready => {
                tracing::debug!(instance = %self.instance, elapsed_ms = self.elapsed_ms(), "page settled");
            }
            Trigger::MaxWait => {
                tracing::warn!(
                    instance = %self.instance,
                    max_wait_ms = self.timing.max_wait_time.as_millis() as u64,
                    "page never settled, forcing overlay out"
                );
            }
        }
        true
    }

    /// Page-side readiness plus the display floor and network quiet window.
    pub(crate) fn verdict(&self, snapshot: &PageSnapshot, now: Instant) -> Readiness {
        let page = self.evaluator.evaluate(snapshot, now);
        if !page.is_ready() {
            return page;
        }
        if now.saturating_duration_since(self.started_at) < self.timing.min_display_time {
            return Readiness::Blocked(Blocker::MinimumDisplay);
        }
        if let Some(activity) = &self.activity {
            let counter = activity.snapshot();
            if counter.in_flight > 0 {
                return Readiness::Blocked(Blocker::RequestsInFlight(counter.in_flight));
            }
            if !counter.is_quiet(now, self.timing.stability_delay) {
                return Readiness::Blocked(Blocker::NetworkSettling);
            }
        }
        Readiness::Ready
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.outcome.subscribe();
        let mut last_blocker = None;

        loop {
            tokio::select! {
                _ = shutdown.wait() => return,
                _ = ticker.tick() => {}
            }
            if self.state() != OrchestratorState::AnimatingPolling {
                return;
            }

            let snapshot = tokio::select! {
                _ = shutdown.wait() => return,
                snapshot = self.probe.snapshot() => snapshot,
            };
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::debug!(instance = %self.instance, error = %e, "page probe failed, retrying next tick");
                    continue;
                }
            };

            match self.verdict(&snapshot, Instant::now()) {
                Readiness::Ready => {
                    if self.trigger(Trigger::Ready) {
                        self.fade_and_complete().await;
                    }
                    return;
                }
                Readiness::Blocked(blocker) => {
                    if last_blocker.as_ref() != Some(&blocker) {
                        tracing::debug!(instance = %self.instance, ?blocker, "overlay waiting");
                        last_blocker = Some(blocker);
                    }
                }
            }
        }
    }

    async fn watchdog(self: Arc<Self>) {
        let mut shutdown = self.outcome.subscribe();
        let deadline = self.started_at + self.timing.max_wait_time;
        tokio::select! {
            _ = shutdown.wait() => return,
            _ = sleep_until(deadline) => {}
        }
        if self.trigger(Trigger::MaxWait) {
            self.fade_and_complete().await;
        }
    }

    /// `Stabilizing -> FadingOut -> Completed`. Gives up silently if the
    /// overlay is unmounted at any point.
    pub(crate) async fn fade_and_complete(&self) {
        let mut shutdown = self.outcome.subscribe();
        if !self.timing.settle_delay.is_zero() {
            tokio::select! {
                _ = shutdown.wait() => return,
                _ = sleep(self.timing.settle_delay) => {}
            }
        }

        if !self.advance(OrchestratorState::Stabilizing, OrchestratorState::FadingOut) {
            return;
        }
        self.animation.stop();
        if let Err(e) = self.renderer.fade_out(self.timing.fade_duration) {
            tracing::trace!(instance = %self.instance, error = %e, "fade-out not rendered");
        }

        tokio::select! {
            _ = shutdown.wait() => return,
            _ = sleep(self.timing.fade_duration) => {}
        }
        self.complete();
    }

    /// The single entry point to `Completed`.
    pub(crate) fn complete(&self) -> bool {
        if !self.advance(OrchestratorState::FadingOut, OrchestratorState::Completed) {
            return false;
        }

        let report = CompletionReport {
            instance: self.instance,
            trigger: lock(&self.trigger).unwrap_or(Trigger::Ready),
            elapsed_ms: self.elapsed_ms(),
        };
        self.completion.fire(report.clone());
        let callback = lock(&self.on_complete).take();
        if let Some(callback) = callback {
            callback(&report);
        }
        tracing::info!(
            instance = %self.instance,
            trigger = ?report.trigger,
            elapsed_ms = report.elapsed_ms,
            "overlay complete"
        );

        self.outcome.fire(Outcome::Completed(report));
        self.teardown();
        true
    }

    /// Unmount before completion. No completion is broadcast afterwards.
    pub(crate) fn cancel(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return false;
            }
            tracing::debug!(instance = %self.instance, from = %*state, "overlay unmounted before completion");
            *state = OrchestratorState::Cancelled;
        }
        lock(&self.on_complete).take();
        self.outcome.fire(Outcome::Cancelled);
        self.teardown();
        true
    }

    fn teardown(&self) {
        if !self.teardown.try_close() {
            return;
        }
        self.animation.stop();
        let handle = lock(&self.intercept).take();
        if let Some(handle) = handle {
            ActivityTracker::end_intercepting(&handle);
        }
    }

    pub(crate) fn animation_running(&self) -> bool {
        self.animation.is_running()
    }
}
