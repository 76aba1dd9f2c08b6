//! Decorative background of the overlay.
//!
//! A frame set is a row of vertical gradient stripes plus a row of thin
//! moving beams, sampled at random from the configured palette. The loop
//! throws the whole set away and samples a new one every regeneration
//! period until it is stopped.

use crate::render::FrameRenderer;
use crate::shared::AnimationConfig;
use curtain_core::OneShot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, interval_at};

#[derive(Debug, Clone, PartialEq)]
pub struct Stripe {
    pub left_pct: f64,
    pub width_pct: f64,
    pub color: String,
    /// Solid color runs from the top down to here
    pub fill_pct: f64,
    /// Fully transparent from here down
    pub fade_pct: f64,
}

impl Stripe {
    pub fn background(&self) -> String {
        format!(
            "linear-gradient(to bottom, {c} 0%, {c} {fill:.1}%, rgba(0, 0, 0, 0) {fade:.1}%, rgba(0, 0, 0, 0) 100%)",
            c = self.color,
            fill = self.fill_pct,
            fade = self.fade_pct,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamDirection {
    Left,
    Right,
}

impl BeamDirection {
    fn class(self) -> &'static str {
        match self {
            Self::Left => "left-moving-beam",
            Self::Right => "right-moving-beam",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    pub left_pct: f64,
    pub width_pct: f64,
    pub color: String,
    pub delay_secs: f64,
    pub brightness: f64,
    pub direction: BeamDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub stripes: Vec<Stripe>,
    /// Sorted by `left_pct`
    pub beams: Vec<Beam>,
}

impl FrameSet {
    /// Markup for the gradient and beam containers, stripes first.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for (i, stripe) in self.stripes.iter().enumerate() {
            let _ = writeln!(
                html,
                r#"<span class="strip-{}" style="left: {:.1}%; width: {:.1}%; background: {}; z-index: {}"></span>"#,
                i + 1,
                stripe.left_pct,
                stripe.width_pct,
                stripe.background(),
                i,
            );
        }
        for (i, beam) in self.beams.iter().enumerate() {
            let _ = writeln!(
                html,
                r#"<span class="beam beam-{} {}" style="left: {:.1}%; width: {:.1}%; animation-delay: {:.2}s; filter: brightness({:.2}); --color: {}"></span>"#,
                i + 1,
                beam.direction.class(),
                beam.left_pct,
                beam.width_pct,
                beam.delay_secs,
                beam.brightness,
                beam.color,
            );
        }
        html
    }
}

pub struct FrameGenerator {
    rng: StdRng,
    config: AnimationConfig,
}

impl FrameGenerator {
    pub fn new(config: AnimationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, config }
    }

    fn pick_color(&mut self) -> String {
        match self.config.palette.len() {
            0 => "#ffffff".to_string(),
            n => self.config.palette[self.rng.gen_range(0..n)].clone(),
        }
    }

    pub fn next_frame_set(&mut self) -> FrameSet {
        let stripe_count = self.config.stripe_count;
        let stripe_width = if stripe_count == 0 { 0.0 } else { 100.0 / stripe_count as f64 };
        let stripes = (0..stripe_count)
            .map(|i| Stripe {
                left_pct: i as f64 * stripe_width,
                // overlap hides seams between neighbours
                width_pct: stripe_width + 0.5,
                color: self.pick_color(),
                fill_pct: self.rng.gen_range(10.0..50.0),
                fade_pct: self.rng.gen_range(60.0..100.0),
            })
            .collect();

        let beam_count = self.config.beam_count;
        let mut beams: Vec<Beam> = (0..beam_count)
            .map(|i| Beam {
                left_pct: (i as f64 / beam_count as f64) * 100.0 + self.rng.gen_range(-0.75..0.75),
                width_pct: self.rng.gen_range(0.5..3.0),
                color: self.pick_color(),
                delay_secs: self.rng.gen_range(0.0..2.0),
                brightness: self.rng.gen_range(1.0..1.8),
                direction: BeamDirection::Left,
            })
            .collect();
        beams.sort_by(|a, b| a.left_pct.total_cmp(&b.left_pct));
        for (i, beam) in beams.iter_mut().enumerate() {
            beam.direction = if i % 2 == 0 { BeamDirection::Left } else { BeamDirection::Right };
        }

        FrameSet { stripes, beams }
    }
}

fn draw(renderer: &dyn FrameRenderer, frames: &FrameSet) {
    if let Err(e) = renderer.render(frames) {
        if e.is_detached() {
            tracing::trace!("overlay detached, frame dropped");
        } else {
            tracing::debug!(error = %e, "frame render failed");
        }
    }
}

/// Shortest regeneration period the loop accepts.
pub const MIN_REGEN_PERIOD: Duration = Duration::from_millis(1);

/// Regenerates the frame set on a fixed period until stopped.
pub struct AnimationLoop {
    /// Held across every regenerated draw; once set, nothing more is drawn.
    stopped: Arc<Mutex<bool>>,
    stop: OneShot<()>,
    regenerations: Arc<AtomicU64>,
}

fn gate(stopped: &Mutex<bool>) -> MutexGuard<'_, bool> {
    stopped.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnimationLoop {
    /// Draws the first frame set immediately, then one per `period`.
    /// Periods below [`MIN_REGEN_PERIOD`] are raised to it.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(renderer: Arc<dyn FrameRenderer>, config: AnimationConfig, period: Duration) -> Self {
        let period = period.max(MIN_REGEN_PERIOD);
        let stopped = Arc::new(Mutex::new(false));
        let stop = OneShot::new();
        let regenerations = Arc::new(AtomicU64::new(0));

        let mut generator = FrameGenerator::new(config);
        draw(renderer.as_ref(), &generator.next_frame_set());

        let mut shutdown = stop.subscribe();
        let task_stopped = Arc::clone(&stopped);
        let task_regenerations = Arc::clone(&regenerations);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {}
                }
                let frames = generator.next_frame_set();
                {
                    let stopped = gate(&task_stopped);
                    if *stopped {
                        break;
                    }
                    draw(renderer.as_ref(), &frames);
                }
                let n = task_regenerations.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(regeneration = n, "animation frames regenerated");
            }
        });

        Self {
            stopped,
            stop,
            regenerations,
        }
    }

    /// Cancels regeneration. Returns `true` only for the first call; once it
    /// returns, no further frame is drawn.
    pub fn stop(&self) -> bool {
        {
            let mut stopped = gate(&self.stopped);
            if *stopped {
                return false;
            }
            *stopped = true;
        }
        self.stop.fire(());
        true
    }

    pub fn is_running(&self) -> bool {
        !*gate(&self.stopped)
    }

    pub fn regenerations(&self) -> u64 {
        self.regenerations.load(Ordering::Relaxed)
    }
}

impl Drop for AnimationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
