pub mod animation;
pub mod orchestrator;
pub mod page;
pub mod readiness;
pub mod render;
mod sequencer;
pub mod shared;

pub use animation::{AnimationLoop, FrameGenerator, FrameSet};
pub use orchestrator::{Orchestrator, OverlayHandle};
pub use page::InMemoryPage;
pub use readiness::{Blocker, PageDataNotifier, Readiness, ReadinessEvaluator};
pub use render::{FrameRenderer, RecordingRenderer};
pub use shared::{AnimationConfig, OverlayConfig, TimingConfig};
