use async_trait::async_trait;
use curtain_core::{
    DocumentState, FontStatus, OrchestratorState, OverlayError, Outcome, PageProbe, PageSnapshot,
    Trigger,
};
use curtain_tracker::NetworkLayer;
use overlay::{InMemoryPage, Orchestrator, OverlayConfig, RecordingRenderer, TimingConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};

fn timing() -> TimingConfig {
    TimingConfig::default()
        .with_min_display(1000)
        .with_stability_delay(300)
        .with_max_wait(10_000)
        .with_poll_interval(200)
        .with_fade(800)
}

fn orchestrator(page: Arc<dyn PageProbe>, timing: TimingConfig) -> Orchestrator {
    Orchestrator::new(page, Arc::new(RecordingRenderer::new()))
        .with_config(OverlayConfig::default().with_timing(timing))
        .unwrap()
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce(&curtain_core::CompletionReport) + Send + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&calls);
    (calls, move |_: &curtain_core::CompletionReport| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[tokio::test(start_paused = true)]
async fn settled_page_completes_after_floor_and_fade() {
    let start = Instant::now();
    let (calls, on_complete) = counter();
    let handle = orchestrator(Arc::new(InMemoryPage::settled()), timing()).mount(on_complete);

    let outcome = handle.finished().await;
    let elapsed = elapsed_ms(start);

    assert!((1800..=2000).contains(&elapsed), "completed at {}ms", elapsed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), OrchestratorState::Completed);
    match outcome {
        Outcome::Completed(report) => {
            assert_eq!(report.trigger, Trigger::Ready);
            assert_eq!(report.instance, handle.instance());
        }
        Outcome::Cancelled => panic!("overlay was cancelled"),
    }
}

#[tokio::test(start_paused = true)]
async fn floor_holds_even_when_ready_instantly() {
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(Arc::new(InMemoryPage::settled()), timing().with_min_display(3000))
        .mount(on_complete);

    handle.finished().await;
    let elapsed = elapsed_ms(start);
    assert!((3800..=4000).contains(&elapsed), "completed at {}ms", elapsed);
}

#[tokio::test(start_paused = true)]
async fn zero_floor_completes_on_first_tick() {
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(Arc::new(InMemoryPage::settled()), timing().with_min_display(0))
        .mount(on_complete);

    handle.finished().await;
    assert_eq!(elapsed_ms(start), 800);
}

#[tokio::test(start_paused = true)]
async fn image_that_never_loads_hits_max_wait() {
    let page = Arc::new(InMemoryPage::settled());
    page.add_image();

    let start = Instant::now();
    let (calls, on_complete) = counter();
    let handle = orchestrator(page, timing()).mount(on_complete);
    let mut completion = handle.completion();

    let report = completion.wait().await.unwrap();
    let elapsed = elapsed_ms(start);
    assert!((10_800..=11_000).contains(&elapsed), "completed at {}ms", elapsed);
    assert_eq!(report.trigger, Trigger::MaxWait);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn broken_image_settles_after_grace() {
    let page = Arc::new(InMemoryPage::settled());
    let image = page.add_image();
    page.image_failed(image);

    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(page, timing().with_image_error_grace(1500)).mount(on_complete);

    let outcome = handle.finished().await;
    let elapsed = elapsed_ms(start);
    assert!((2300..=2500).contains(&elapsed), "completed at {}ms", elapsed);
    assert!(outcome.is_completed());
}

#[tokio::test(start_paused = true)]
async fn failed_fonts_do_not_block() {
    let page = Arc::new(InMemoryPage::settled());
    page.set_fonts(FontStatus::Loading);

    let (_calls, on_complete) = counter();
    let handle = orchestrator(page.clone(), timing()).mount(on_complete);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(handle.state(), OrchestratorState::AnimatingPolling);

    page.set_fonts(FontStatus::Failed);
    let start = Instant::now();
    handle.finished().await;
    assert!(elapsed_ms(start) <= 1000);
}

#[tokio::test(start_paused = true)]
async fn network_burst_defers_completion() {
    let layer = NetworkLayer::new();
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(Arc::new(InMemoryPage::settled()), timing().with_min_display(0))
        .with_network(layer.clone())
        .mount(on_complete);

    let first = layer.begin_request();
    let burst = layer.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(1000)).await;
        drop(first);
        // second call of the same burst lands inside the quiet window
        sleep(Duration::from_millis(200)).await;
        let second = burst.begin_request();
        sleep(Duration::from_millis(100)).await;
        drop(second);
    });

    handle.finished().await;
    let elapsed = elapsed_ms(start);
    // last activity at 1300ms, quiet window 300ms, fade 800ms
    assert!((2400..=2600).contains(&elapsed), "completed at {}ms", elapsed);
    assert_eq!(layer.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_request_is_bounded_by_max_wait() {
    let layer = NetworkLayer::new();
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(Arc::new(InMemoryPage::settled()), timing())
        .with_network(layer.clone())
        .mount(on_complete);

    let _stuck = layer.begin_request();
    let outcome = handle.finished().await;
    assert_eq!(elapsed_ms(start), 10_800);
    match outcome {
        Outcome::Completed(report) => assert_eq!(report.trigger, Trigger::MaxWait),
        Outcome::Cancelled => panic!("overlay was cancelled"),
    }
    assert_eq!(layer.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_signal_gates_completion() {
    let page = Arc::new(InMemoryPage::settled());
    page.require_page_data(true);

    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(page, timing().with_min_display(500)).mount(on_complete);

    let notifier = handle.page_data_notifier();
    tokio::spawn(async move {
        sleep(Duration::from_millis(2000)).await;
        notifier.notify();
        notifier.notify();
    });

    handle.finished().await;
    let elapsed = elapsed_ms(start);
    assert!((2800..=3000).contains(&elapsed), "completed at {}ms", elapsed);
}

#[tokio::test(start_paused = true)]
async fn signal_is_scoped_to_its_mount() {
    let page = Arc::new(InMemoryPage::settled());
    page.require_page_data(true);
    let orchestrator = orchestrator(page, timing().with_min_display(0));

    let (_first_calls, first_complete) = counter();
    let first = orchestrator.mount(first_complete);
    first.page_data_notifier().notify();
    first.finished().await;

    let (_second_calls, second_complete) = counter();
    let second = orchestrator.mount(second_complete);
    assert!(!second.page_data_notifier().is_received());
    sleep(Duration::from_millis(3000)).await;
    assert_eq!(second.state(), OrchestratorState::AnimatingPolling);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_ready_and_max_wait_complete_once() {
    // The first ready tick and the watchdog both land at 1000ms.
    let start = Instant::now();
    let (calls, on_complete) = counter();
    let handle = orchestrator(
        Arc::new(InMemoryPage::settled()),
        timing().with_min_display(1000).with_max_wait(1000),
    )
    .mount(on_complete);

    let mut listeners: Vec<_> = (0..3).map(|_| handle.completion()).collect();
    handle.finished().await;
    assert_eq!(elapsed_ms(start), 1800);

    sleep(Duration::from_millis(20_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for listener in &mut listeners {
        assert!(listener.wait().await.is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn unmount_mid_fade_never_completes() {
    let layer = NetworkLayer::new();
    let renderer = Arc::new(RecordingRenderer::new());
    let (calls, on_complete) = counter();
    let handle = Orchestrator::new(Arc::new(InMemoryPage::settled()), renderer.clone())
        .with_config(OverlayConfig::default().with_timing(timing()))
        .unwrap()
        .with_network(layer.clone())
        .mount(on_complete);
    let completion = handle.completion();

    sleep(Duration::from_millis(1400)).await;
    assert_eq!(handle.state(), OrchestratorState::FadingOut);
    assert_eq!(renderer.fades(), vec![Duration::from_millis(800)]);

    assert!(handle.unmount());
    assert!(!handle.unmount());
    sleep(Duration::from_millis(5000)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(completion.get().is_none());
    assert_eq!(handle.outcome(), Some(Outcome::Cancelled));
    assert_eq!(layer.observer_count(), 0);
    assert!(!handle.is_animating());
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_unmounts() {
    let layer = NetworkLayer::new();
    let renderer = Arc::new(RecordingRenderer::new());
    let (calls, on_complete) = counter();
    let handle = Orchestrator::new(Arc::new(InMemoryPage::new()), renderer.clone())
        .with_network(layer.clone())
        .mount(on_complete);
    assert_eq!(layer.observer_count(), 1);
    let finished = handle.finished();

    drop(handle);
    assert_eq!(finished.await, Outcome::Cancelled);
    assert_eq!(layer.observer_count(), 0);

    let renders = renderer.render_count();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(renderer.render_count(), renders);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn animation_regenerates_while_waiting() {
    let renderer = Arc::new(RecordingRenderer::new());
    let page = Arc::new(InMemoryPage::new());
    let (_calls, on_complete) = counter();
    let handle = Orchestrator::new(page.clone(), renderer.clone())
        .with_config(OverlayConfig::default().with_timing(timing().with_max_wait(60_000)))
        .unwrap()
        .mount(on_complete);

    sleep(Duration::from_millis(11_100)).await;
    assert_eq!(renderer.render_count(), 3);
    assert!(handle.is_animating());

    page.set_document(DocumentState::Complete);
    handle.finished().await;
    assert!(!handle.is_animating());
    let renders = renderer.render_count();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(renderer.render_count(), renders);
}

#[tokio::test(start_paused = true)]
async fn detached_renderer_still_completes() {
    let renderer = Arc::new(RecordingRenderer::new());
    renderer.detach();
    let (calls, on_complete) = counter();
    let handle = Orchestrator::new(Arc::new(InMemoryPage::settled()), renderer.clone())
        .mount(on_complete);

    assert!(handle.finished().await.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(renderer.fades().is_empty());
}

struct FlakyPage {
    failures: AtomicUsize,
}

#[async_trait]
impl PageProbe for FlakyPage {
    async fn snapshot(&self) -> Result<PageSnapshot, OverlayError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OverlayError::probe_error("execution context was destroyed"));
        }
        Ok(PageSnapshot {
            document: DocumentState::Complete,
            ..PageSnapshot::default()
        })
    }
}

#[tokio::test(start_paused = true)]
async fn probe_errors_retry_next_tick() {
    let page = Arc::new(FlakyPage {
        failures: AtomicUsize::new(8),
    });
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(page, timing().with_min_display(0)).mount(on_complete);

    assert!(handle.finished().await.is_completed());
    // eight failing ticks (0..1400ms), ready at 1600ms
    assert_eq!(elapsed_ms(start), 2400);
}

#[tokio::test(start_paused = true)]
async fn settle_delay_holds_before_fade() {
    let start = Instant::now();
    let (_calls, on_complete) = counter();
    let handle = orchestrator(
        Arc::new(InMemoryPage::settled()),
        timing().with_min_display(0).with_settle_delay(1500),
    )
    .mount(on_complete);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(handle.state(), OrchestratorState::Stabilizing);
    handle.finished().await;
    assert_eq!(elapsed_ms(start), 2300);
}
