use async_trait::async_trait;
use curtain_core::{
    DocumentState, FontStatus, ImageStatus, OverlayError, PageProbe, PageSnapshot,
};
use curtain_tracker::TrackedClient;
use scraper::{Html, Selector};
use serde_json::json;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Attribute a page sets when it loads its own data and will signal it.
pub const WAIT_MARKER: &str = "data-wait-for-api";

#[derive(Debug)]
struct PageState {
    /// (src, status) in document order; `src` may be empty
    images: Vec<(String, ImageStatus)>,
    fonts: FontStatus,
}

/// Page probe built from server-rendered markup.
///
/// Parsing enumerates the `<img>` elements and the wait marker once; the
/// host then reports decode results by `src` as images arrive.
#[derive(Debug)]
pub struct HtmlPage {
    waits_for_data: bool,
    state: Mutex<PageState>,
}

fn selector(raw: &str) -> Result<Selector, OverlayError> {
    Selector::parse(raw).map_err(|e| {
        OverlayError::parsing_error(e.to_string()).with_context(json!({ "selector": raw }))
    })
}

impl HtmlPage {
    pub fn parse(markup: &str) -> Result<Self, OverlayError> {
        let document = Html::parse_document(markup);
        let img = selector("img")?;
        let marker = selector(&format!("[{}]", WAIT_MARKER))?;

        let images = document
            .select(&img)
            .map(|el| {
                let src = el.value().attr("src").unwrap_or("").to_string();
                (src, ImageStatus::Pending)
            })
            .collect();
        let waits_for_data = document.select(&marker).next().is_some();

        Ok(Self {
            waits_for_data,
            state: Mutex::new(PageState {
                images,
                fonts: FontStatus::Unsupported,
            }),
        })
    }

    /// Fetches the page through a tracked client, so the fetch itself
    /// counts as network activity for any mounted overlay.
    pub async fn fetch(client: &TrackedClient, url: &str) -> Result<Self, OverlayError> {
        let markup = client.get_text(url).await?;
        Self::parse(&markup).map_err(|e| e.with_context(json!({ "url": url })))
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn waits_for_data(&self) -> bool {
        self.waits_for_data
    }

    pub fn image_sources(&self) -> Vec<String> {
        self.state().images.iter().map(|(src, _)| src.clone()).collect()
    }

    /// Marks every image with this `src` decoded; returns how many matched.
    pub fn mark_decoded(&self, src: &str) -> usize {
        self.mark(src, ImageStatus::Decoded)
    }

    pub fn mark_failed(&self, src: &str) -> usize {
        self.mark(src, ImageStatus::Broken { since: Instant::now() })
    }

    fn mark(&self, src: &str, status: ImageStatus) -> usize {
        let mut state = self.state();
        let mut matched = 0;
        for (image_src, image_status) in state.images.iter_mut() {
            if image_src == src {
                *image_status = status;
                matched += 1;
            }
        }
        matched
    }

    pub fn set_fonts(&self, fonts: FontStatus) {
        self.state().fonts = fonts;
    }
}

#[async_trait]
impl PageProbe for HtmlPage {
    async fn snapshot(&self) -> Result<PageSnapshot, OverlayError> {
        let state = self.state();
        Ok(PageSnapshot {
            // markup is fully parsed before the probe exists
            document: DocumentState::Complete,
            fonts: state.fonts,
            images: state.images.iter().map(|(_, status)| *status).collect(),
            waits_for_data: self.waits_for_data,
        })
    }
}
