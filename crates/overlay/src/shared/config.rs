use curtain_core::OverlayError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Durations are (de)serialized as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Floor on how long the overlay stays up. Zero disables it.
    #[serde(rename = "min_display_time_ms", with = "millis")]
    pub min_display_time: Duration,
    /// Quiet period required after the last network activity
    #[serde(rename = "stability_delay_ms", with = "millis")]
    pub stability_delay: Duration,
    /// Unconditional upper bound before the fade starts
    #[serde(rename = "max_wait_time_ms", with = "millis")]
    pub max_wait_time: Duration,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "fade_duration_ms", with = "millis")]
    pub fade_duration: Duration,
    #[serde(rename = "regen_period_ms", with = "millis")]
    pub regen_period: Duration,
    /// Hold between the readiness verdict and the start of the fade
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// How long a broken image blocks before it counts as settled
    #[serde(rename = "image_error_grace_ms", with = "millis")]
    pub image_error_grace: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_display_time: Duration::from_millis(500),
            stability_delay: Duration::from_millis(300),
            max_wait_time: Duration::from_millis(10000),
            poll_interval: Duration::from_millis(200),
            fade_duration: Duration::from_millis(800),
            regen_period: Duration::from_millis(5500),
            settle_delay: Duration::ZERO,
            image_error_grace: Duration::from_millis(1500),
        }
    }
}

impl TimingConfig {
    pub fn with_min_display(mut self, ms: u64) -> Self {
        self.min_display_time = Duration::from_millis(ms);
        self
    }

    pub fn with_stability_delay(mut self, ms: u64) -> Self {
        self.stability_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_max_wait(mut self, ms: u64) -> Self {
        self.max_wait_time = Duration::from_millis(ms);
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_fade(mut self, ms: u64) -> Self {
        self.fade_duration = Duration::from_millis(ms);
        self
    }

    pub fn with_settle_delay(mut self, ms: u64) -> Self {
        self.settle_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_image_error_grace(mut self, ms: u64) -> Self {
        self.image_error_grace = Duration::from_millis(ms);
        self
    }

    /// Cached pages: no display floor, short fade.
    pub fn fast() -> Self {
        Self {
            min_display_time: Duration::ZERO,
            stability_delay: Duration::from_millis(150),
            max_wait_time: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(100),
            fade_duration: Duration::from_millis(400),
            regen_period: Duration::from_millis(5500),
            settle_delay: Duration::ZERO,
            image_error_grace: Duration::from_millis(750),
        }
    }

    pub fn patient() -> Self {
        Self {
            min_display_time: Duration::from_millis(1000),
            stability_delay: Duration::from_millis(500),
            max_wait_time: Duration::from_millis(20000),
            poll_interval: Duration::from_millis(250),
            fade_duration: Duration::from_millis(800),
            regen_period: Duration::from_millis(5500),
            settle_delay: Duration::from_millis(1500),
            image_error_grace: Duration::from_millis(3000),
        }
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.poll_interval.is_zero() {
            return Err(OverlayError::config_error("poll interval must be non-zero")
                .with_context(json!({ "field": "poll_interval_ms" })));
        }
        if self.regen_period.is_zero() {
            return Err(OverlayError::config_error("regeneration period must be non-zero")
                .with_context(json!({ "field": "regen_period_ms" })));
        }
        if self.max_wait_time < self.min_display_time {
            return Err(OverlayError::config_error("max wait is shorter than the display floor")
                .with_context(json!({
                    "max_wait_time_ms": self.max_wait_time.as_millis() as u64,
                    "min_display_time_ms": self.min_display_time.as_millis() as u64,
                })));
        }
        Ok(())
    }
}

pub const DEFAULT_PALETTE: &[&str] = &[
    "#ff1500", "#ffff00", "#ff00ff", "#00ff9f", "#ff5500", "#ffaa00",
    "#00a9ff", "#bf00ff", "#ffdd00", "#00ffff", "#ff153b", "#ff00cc",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub stripe_count: usize,
    pub beam_count: usize,
    pub palette: Vec<String>,
    /// Fixed seed for reproducible frames; entropy when unset
    pub seed: Option<u64>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            stripe_count: 20,
            beam_count: 28,
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            seed: None,
        }
    }
}

impl AnimationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub timing: TimingConfig,
    pub animation: AnimationConfig,
}

impl OverlayConfig {
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, OverlayError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| OverlayError::config_error(format!("invalid overlay config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OverlayError::config_error(format!("failed to read overlay config: {}", e))
                .with_context(json!({ "path": path.display().to_string() }))
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        self.timing.validate()?;
        if self.animation.palette.is_empty() {
            return Err(OverlayError::config_error("animation palette is empty")
                .with_context(json!({ "field": "palette" })));
        }
        Ok(())
    }
}
