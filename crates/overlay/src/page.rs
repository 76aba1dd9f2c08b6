use async_trait::async_trait;
use curtain_core::{DocumentState, FontStatus, ImageStatus, OverlayError, PageProbe, PageSnapshot};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Page model driven directly by the host.
#[derive(Debug, Default)]
pub struct InMemoryPage {
    state: Mutex<PageSnapshot>,
}

impl InMemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document complete, no images, no font facility.
    pub fn settled() -> Self {
        let page = Self::new();
        page.set_document(DocumentState::Complete);
        page
    }

    fn state(&self) -> MutexGuard<'_, PageSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a pending image and returns its index.
    pub fn add_image(&self) -> usize {
        let mut state = self.state();
        state.images.push(ImageStatus::Pending);
        state.images.len() - 1
    }

    pub fn image_decoded(&self, index: usize) {
        if let Some(image) = self.state().images.get_mut(index) {
            *image = ImageStatus::Decoded;
        }
    }

    pub fn image_failed(&self, index: usize) {
        if let Some(image) = self.state().images.get_mut(index) {
            *image = ImageStatus::Broken { since: Instant::now() };
        }
    }

    pub fn set_fonts(&self, fonts: FontStatus) {
        self.state().fonts = fonts;
    }

    pub fn set_document(&self, document: DocumentState) {
        self.state().document = document;
    }

    /// Marks the page as one that signals its own data load.
    pub fn require_page_data(&self, required: bool) {
        self.state().waits_for_data = required;
    }
}

#[async_trait]
impl PageProbe for InMemoryPage {
    async fn snapshot(&self) -> Result<PageSnapshot, OverlayError> {
        Ok(self.state().clone())
    }
}
