use curtain_core::FontStatus;
use curtain_parser::HtmlPage;
use curtain_shell::{Navigation, Shell};
use curtain_tracker::NetworkLayer;
use overlay::{OverlayConfig, RecordingRenderer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const HOME: &str = r#"<html><body>
  <h1>portfolio</h1>
  <img src="/img/portrait.jpg">
  <img src="/img/stack.svg">
</body></html>"#;

const REPOSITORIES: &str = r#"<html><body>
  <section data-wait-for-api="github"><ul id="repos"></ul></section>
</body></html>"#;

fn init_tracing() {
    let filter = std::env::var("CURTAIN_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let renderer = Arc::new(RecordingRenderer::new());
    let (shell, receiver) = Shell::new(
        renderer.clone(),
        NetworkLayer::new(),
        OverlayConfig::default(),
        4,
    )?;
    let network = shell.network().clone();
    let runner = tokio::spawn(shell.clone().run(receiver));

    let home = Arc::new(HtmlPage::parse(HOME)?);
    shell.navigate(Navigation::new("/", home.clone()))?;
    let images = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        home.set_fonts(FontStatus::Loaded);
        for src in home.image_sources() {
            tokio::time::sleep(Duration::from_millis(250)).await;
            home.mark_decoded(&src);
        }
    });

    // user clicks through before the home overlay is gone
    tokio::time::sleep(Duration::from_millis(300)).await;
    let repos = Arc::new(HtmlPage::parse(REPOSITORIES)?);
    let nav = Navigation::new("/repositories", repos).on_mount(move |notifier| {
        tokio::spawn(async move {
            let scope = network.begin_request();
            tokio::time::sleep(Duration::from_millis(1200)).await;
            scope.finish();
            notifier.notify();
        });
    });
    shell.navigate(nav)?;
    drop(shell);

    let history = runner.await?;
    images.await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    println!(
        "frames drawn: {}, fades: {}",
        renderer.render_count(),
        renderer.fades().len()
    );
    Ok(())
}
