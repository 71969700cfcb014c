//! Idle brightness dimming
//!
//! After every full idle interval without a button press the brightness
//! scale halves. Once it drops below the floor the LEDs switch fully off.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::device::{LedContext, SharedLeds};

/// Changes smaller than this are not written to the strip
const SCALE_EPSILON: f32 = 1e-3;

/// Tracks interaction recency and drives the idle scale
pub struct IdleDimmer {
    interval: Duration,
    floor: f32,
    last_interaction: Instant,
    scale: f32,
}

impl IdleDimmer {
    pub fn new(interval: Duration, floor: f32, now: Instant) -> Self {
        Self {
            interval,
            floor,
            last_interaction: now,
            scale: 1.0,
        }
    }

    #[cfg(test)]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Reset the idle timer and wake the LEDs if they were dimmed
    pub fn record_interaction(&mut self, now: Instant, leds: &SharedLeds) {
        self.last_interaction = now;
        if self.scale != 1.0 {
            self.scale = 1.0;
            LedContext::lock(leds).set_idle_scale(1.0);
            debug!("idle dimming reset");
        }
    }

    /// Recompute the scale for the current loop iteration
    pub fn tick(&mut self, now: Instant, leds: &SharedLeds) {
        let elapsed = now.saturating_duration_since(self.last_interaction);
        let scale = idle_scale(elapsed, self.interval, self.floor);
        if (scale - self.scale).abs() > SCALE_EPSILON {
            debug!(scale, elapsed_secs = elapsed.as_secs(), "idle dimming");
            self.scale = scale;
            LedContext::lock(leds).set_idle_scale(scale);
        }
    }
}

/// `0.5^k` for `k` full idle intervals, snapping to 0 below `floor`
pub fn idle_scale(elapsed: Duration, interval: Duration, floor: f32) -> f32 {
    if interval.is_zero() || elapsed < interval {
        return 1.0;
    }
    let intervals = (elapsed.as_secs_f64() / interval.as_secs_f64()).floor();
    let scale = 0.5_f64.powf(intervals) as f32;
    if scale < floor {
        0.0
    } else {
        scale
    }
}
