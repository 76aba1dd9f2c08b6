use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

pub mod signal;

pub use signal::{Listener, OneShot};

/// Lifecycle of a single overlay mount.
///
/// Transitions only move forward. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Initializing,
    /// Animation running, readiness being polled
    AnimatingPolling,
    /// A readiness verdict (or the max-wait fallback) was reached
    Stabilizing,
    FadingOut,
    Completed,
    /// Unmounted before completion; no completion is ever broadcast
    Cancelled,
}

impl OrchestratorState {
    fn rank(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::AnimatingPolling => 1,
            Self::Stabilizing => 2,
            Self::FadingOut => 3,
            Self::Completed | Self::Cancelled => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(self, next: OrchestratorState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::AnimatingPolling => "animating+polling",
            Self::Stabilizing => "stabilizing",
            Self::FadingOut => "fading-out",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What moved the sequencer out of polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Page settled and every timing condition held
    Ready,
    /// The max-wait watchdog fired first
    MaxWait,
}

/// Broadcast once per mount after the fade-out has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub instance: Uuid,
    pub trigger: Trigger,
    /// Time from mount to completion
    pub elapsed_ms: u64,
}

/// Final result of a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Completed(CompletionReport),
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Loading,
    Interactive,
    Complete,
}

/// State of the host's font-loading facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStatus {
    /// Host has no font-loading facility
    Unsupported,
    Loading,
    Loaded,
    /// A rejected font load counts as settled
    Failed,
}

impl FontStatus {
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Pending,
    Decoded,
    /// Load failed at `since`
    Broken { since: Instant },
}

/// Point-in-time view of everything on the page that gates readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub document: DocumentState,
    pub fonts: FontStatus,
    pub images: Vec<ImageStatus>,
    /// Page carries the "waits for data" marker and needs an explicit signal
    pub waits_for_data: bool,
}

impl Default for PageSnapshot {
    fn default() -> Self {
        Self {
            document: DocumentState::Loading,
            fonts: FontStatus::Unsupported,
            images: Vec::new(),
            waits_for_data: false,
        }
    }
}

/// Error categories for overlay plumbing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network layer registration failed
    Interception,
    /// Page state could not be read
    Probe,
    /// Frame rendering failed
    Render,
    /// Mount point is gone (overlay mid-teardown)
    Detached,
    /// Request failures on tracked clients
    Network,
    Timeout,
    /// Invalid or unreadable configuration
    Config,
    /// Markup parsing errors
    Parsing,
}

/// Structured error with context for debugging
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{category:?}] {message}")]
pub struct OverlayError {
    pub category: ErrorCategory,
    pub message: String,
    /// Optional context (instance id, url, config field, ...)
    pub context: serde_json::Value,
    pub recoverable: bool,
}

impl OverlayError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            context: serde_json::json!({}),
            recoverable: false,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn interception_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Interception, message)
    }

    pub fn probe_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Probe, message).recoverable()
    }

    pub fn render_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Render, message)
    }

    pub fn detached() -> Self {
        Self::new(ErrorCategory::Detached, "mount point is detached").recoverable()
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message).recoverable()
    }

    pub fn timeout_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message).recoverable()
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, message)
    }

    pub fn parsing_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Parsing, message)
    }

    pub fn is_detached(&self) -> bool {
        self.category == ErrorCategory::Detached
    }
}

/// Source of page state for the readiness evaluator.
///
/// Implementations read whatever the host exposes (a live DOM, parsed
/// markup, an in-memory model) and must not mutate it.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn snapshot(&self) -> Result<PageSnapshot, OverlayError>;
}

/// Hooks the host networking layer calls around every request.
pub trait NetworkActivityObserver: Send + Sync {
    fn on_request_start(&self);
    /// Called once per start, whether the request succeeded or failed
    fn on_request_end(&self);
}
