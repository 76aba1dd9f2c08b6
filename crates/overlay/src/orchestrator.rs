use crate::readiness::PageDataNotifier;
use crate::render::FrameRenderer;
use crate::sequencer::{Sequencer, SequencerParts};
use crate::shared::OverlayConfig;
use curtain_core::{
    CompletionReport, Listener, OrchestratorState, Outcome, OverlayError, PageProbe,
};
use curtain_tracker::NetworkLayer;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

/// Mounts loading overlays for one page surface.
pub struct Orchestrator {
    config: OverlayConfig,
    probe: Arc<dyn PageProbe>,
    renderer: Arc<dyn FrameRenderer>,
    network: Option<NetworkLayer>,
}

impl Orchestrator {
    pub fn new(probe: Arc<dyn PageProbe>, renderer: Arc<dyn FrameRenderer>) -> Self {
        Self {
            config: OverlayConfig::default(),
            probe,
            renderer,
            network: None,
        }
    }

    pub fn with_config(mut self, config: OverlayConfig) -> Result<Self, OverlayError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Without a network layer the overlay has no view of requests and
    /// decides on page state alone.
    pub fn with_network(mut self, layer: NetworkLayer) -> Self {
        self.network = Some(layer);
        self
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Starts a fresh overlay. `on_complete` runs exactly once, after the
    /// fade-out, and never if the handle is unmounted first.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn mount<F>(&self, on_complete: F) -> OverlayHandle
    where
        F: FnOnce(&CompletionReport) + Send + 'static,
    {
        let sequencer = Arc::new(Sequencer::new(SequencerParts {
            config: self.config.clone(),
            probe: Arc::clone(&self.probe),
            renderer: Arc::clone(&self.renderer),
            network: self.network.clone(),
            on_complete: Box::new(on_complete),
        }));
        sequencer.start();
        tracing::debug!(instance = %sequencer.instance, "overlay mounted");
        OverlayHandle { sequencer }
    }
}

/// Owner of one mounted overlay. Dropping it unmounts.
pub struct OverlayHandle {
    sequencer: Arc<Sequencer>,
}

impl OverlayHandle {
    pub fn instance(&self) -> Uuid {
        self.sequencer.instance
    }

    pub fn state(&self) -> OrchestratorState {
        self.sequencer.state()
    }

    pub fn page_data_notifier(&self) -> PageDataNotifier {
        self.sequencer.evaluator.notifier()
    }

    /// Fires once with the report when the overlay completes.
    pub fn completion(&self) -> Listener<CompletionReport> {
        self.sequencer.completion.subscribe()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.sequencer.outcome.get()
    }

    /// Resolves when the overlay completes or is unmounted.
    pub fn finished(&self) -> BoxFuture<'static, Outcome> {
        let mut listener = self.sequencer.outcome.subscribe();
        async move { listener.wait().await.unwrap_or(Outcome::Cancelled) }.boxed()
    }

    pub fn is_animating(&self) -> bool {
        self.sequencer.animation_running()
    }

    /// Tears the overlay down without completing it. Returns `false` if it
    /// had already completed or been unmounted.
    pub fn unmount(&self) -> bool {
        self.sequencer.cancel()
    }
}

impl Drop for OverlayHandle {
    fn drop(&mut self) {
        self.sequencer.cancel();
    }
}
