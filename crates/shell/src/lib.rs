use curtain_core::{OverlayError, Outcome, PageProbe};
use curtain_tracker::NetworkLayer;
use futures::stream::{FuturesUnordered, StreamExt};
use overlay::{FrameRenderer, Orchestrator, OverlayConfig, OverlayHandle, PageDataNotifier};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type MountHook = Box<dyn FnOnce(PageDataNotifier) + Send>;

/// One client-side navigation: the page it lands on and how to read it.
pub struct Navigation {
    pub path: String,
    pub probe: Arc<dyn PageProbe>,
    on_mount: Option<MountHook>,
}

impl Navigation {
    pub fn new(path: impl Into<String>, probe: Arc<dyn PageProbe>) -> Self {
        Self {
            path: path.into(),
            probe,
            on_mount: None,
        }
    }

    /// Hands the page its data notifier once its overlay is mounted.
    pub fn on_mount<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(PageDataNotifier) + Send + 'static,
    {
        self.on_mount = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for Navigation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigation").field("path", &self.path).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationRecord {
    pub path: String,
    pub instance: Uuid,
    pub outcome: Outcome,
}

/// Page shell: one fresh overlay per navigation, previous one unmounted.
pub struct Shell {
    renderer: Arc<dyn FrameRenderer>,
    network: NetworkLayer,
    config: OverlayConfig,
    sender: mpsc::Sender<Navigation>,
}

impl Clone for Shell {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            network: self.network.clone(),
            config: self.config.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl Shell {
    pub fn new(
        renderer: Arc<dyn FrameRenderer>,
        network: NetworkLayer,
        config: OverlayConfig,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<Navigation>), OverlayError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(capacity);
        let shell = Self {
            renderer,
            network,
            config,
            sender: tx,
        };
        Ok((shell, rx))
    }

    pub fn navigate(&self, navigation: Navigation) -> Result<(), mpsc::error::TrySendError<Navigation>> {
        self.sender.try_send(navigation)
    }

    pub fn network(&self) -> &NetworkLayer {
        &self.network
    }

    /// Drives navigations until every sender is gone and every mounted
    /// overlay has finished. Returns one record per mount, in finish order.
    pub async fn run(self, mut receiver: mpsc::Receiver<Navigation>) -> Vec<NavigationRecord> {
        let Shell {
            renderer,
            network,
            config,
            sender,
        } = self;
        // Only external clones keep the queue open.
        drop(sender);

        let mut pending = FuturesUnordered::new();
        let mut current: Option<OverlayHandle> = None;
        let mut history = Vec::new();

        loop {
            tokio::select! {
                Some(navigation) = receiver.recv() => {
                    if let Some(previous) = current.take() {
                        if previous.unmount() {
                            tracing::debug!(instance = %previous.instance(), "previous overlay unmounted by navigation");
                        }
                    }

                    let path = navigation.path.clone();
                    match mount(&renderer, &network, &config, navigation) {
                        Ok(handle) => {
                            let instance = handle.instance();
                            let finished = handle.finished();
                            pending.push(async move { (path, instance, finished.await) });
                            current = Some(handle);
                        }
                        Err(e) => tracing::error!(%path, error = %e, "overlay mount failed"),
                    }
                }
                Some((path, instance, outcome)) = pending.next() => {
                    if current.as_ref().is_some_and(|h| h.instance() == instance) {
                        current = None;
                    }
                    if outcome == Outcome::Cancelled {
                        tracing::debug!(%path, %instance, "overlay cancelled");
                    }
                    history.push(NavigationRecord { path, instance, outcome });
                }
                else => break,
            }
        }

        history
    }
}

fn mount(
    renderer: &Arc<dyn FrameRenderer>,
    network: &NetworkLayer,
    config: &OverlayConfig,
    navigation: Navigation,
) -> Result<OverlayHandle, OverlayError> {
    let Navigation { path, probe, on_mount } = navigation;
    let orchestrator = Orchestrator::new(probe, Arc::clone(renderer))
        .with_config(config.clone())?
        .with_network(network.clone());

    let completed_path = path.clone();
    let handle = orchestrator.mount(move |report| {
        tracing::info!(path = %completed_path, elapsed_ms = report.elapsed_ms, "overlay removed");
    });
    tracing::info!(%path, instance = %handle.instance(), "overlay mounted");

    if let Some(hook) = on_mount {
        hook(handle.page_data_notifier());
    }
    Ok(handle)
}
