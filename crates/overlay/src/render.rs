use crate::animation::FrameSet;
use curtain_core::OverlayError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Draws the overlay. Implementations return [`OverlayError::detached`]
/// when the mount point is gone; callers treat that as a no-op.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, frames: &FrameSet) -> Result<(), OverlayError>;
    fn fade_out(&self, duration: Duration) -> Result<(), OverlayError>;
}

#[derive(Debug, Default)]
struct Recording {
    renders: usize,
    last_markup: Option<String>,
    last_frames: Option<FrameSet>,
    fades: Vec<Duration>,
    detached: bool,
}

/// Keeps what was drawn in memory; for headless hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    inner: Mutex<Recording>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn recording(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates the mount point disappearing mid-teardown.
    pub fn detach(&self) {
        self.recording().detached = true;
    }

    pub fn render_count(&self) -> usize {
        self.recording().renders
    }

    pub fn last_frames(&self) -> Option<FrameSet> {
        self.recording().last_frames.clone()
    }

    pub fn last_markup(&self) -> Option<String> {
        self.recording().last_markup.clone()
    }

    pub fn fades(&self) -> Vec<Duration> {
        self.recording().fades.clone()
    }
}

impl FrameRenderer for RecordingRenderer {
    fn render(&self, frames: &FrameSet) -> Result<(), OverlayError> {
        let mut recording = self.recording();
        if recording.detached {
            return Err(OverlayError::detached());
        }
        recording.renders += 1;
        recording.last_markup = Some(frames.to_html());
        recording.last_frames = Some(frames.clone());
        Ok(())
    }

    fn fade_out(&self, duration: Duration) -> Result<(), OverlayError> {
        let mut recording = self.recording();
        if recording.detached {
            return Err(OverlayError::detached());
        }
        recording.fades.push(duration);
        Ok(())
    }
}
