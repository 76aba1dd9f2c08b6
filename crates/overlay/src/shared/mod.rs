pub mod config;

pub use config::{AnimationConfig, OverlayConfig, TimingConfig};
