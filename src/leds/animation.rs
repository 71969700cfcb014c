//! Cancellable background LED animations
//!
//! At most one animation task owns the strip at a time. Starting a new
//! effect always stops the previous one first, and stopping is a
//! signal followed by a bounded join.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::device::{LedContext, Rgb, SharedLeds};

/// Longest wait for a running animation to observe its stop flag
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(200);

const BREATHE_FRAME: Duration = Duration::from_millis(50);
const RAINBOW_FRAME: Duration = Duration::from_millis(30);
const TALKING_FRAME: Duration = Duration::from_millis(35);
const STROBE_PERIOD: Duration = Duration::from_millis(80);
const HOLD_SLICE: Duration = Duration::from_millis(40);

/// Brightness of a step in a server-supplied sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepBrightness {
    /// Use the ambient requested brightness
    Inherit,
    Level(f32),
}

/// One timed state of a server-supplied LED sequence
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationStep {
    /// Sort key declared by the server
    pub index: i64,
    pub duration: Duration,
    pub brightness: StepBrightness,
    pub led0: Rgb,
    pub led1: Rgb,
}

/// The effects the engine can run
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Sinusoidal brightness pulse
    Breathe(Rgb),
    /// Hue rotation on both pixels
    Rainbow,
    /// Out-of-phase cyan/blue shimmer
    Talking,
    /// Alternating color and off
    Strobe(Rgb),
    /// Looping server-supplied steps; empty falls back to `Talking`
    Sequence(Vec<AnimationStep>),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Breathe(_) => "breathe",
            Effect::Rainbow => "rainbow",
            Effect::Talking => "talking",
            Effect::Strobe(_) => "strobe",
            Effect::Sequence(_) => "sequence",
        }
    }
}

struct ActiveAnimation {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owner of the single background animation task
pub struct AnimationEngine {
    leds: SharedLeds,
    active: Option<ActiveAnimation>,
}

impl AnimationEngine {
    pub fn new(leds: SharedLeds) -> Self {
        Self { leds, active: None }
    }

    pub fn leds(&self) -> &SharedLeds {
        &self.leds
    }

    /// Name of the running effect, if any
    pub fn current(&self) -> Option<&'static str> {
        self.active.as_ref().map(|a| a.name)
    }

    /// Replace whatever is running with `effect`
    pub async fn start(&mut self, effect: Effect) {
        if self.active.is_some() {
            self.stop().await;
        }

        let name = effect.name();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_effect(effect, Arc::clone(&self.leds), Arc::clone(&stop)));
        debug!(name, "animation started");

        self.active = Some(ActiveAnimation { name, stop, handle });
    }

    /// Stop the running animation, then leave both pixels off at the
    /// ambient brightness
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::SeqCst);
            let mut handle = active.handle;
            match timeout(JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!(name = active.name, "animation stopped"),
                Ok(Err(e)) => warn!(name = active.name, ?e, "animation task failed"),
                Err(_) => {
                    warn!(name = active.name, "animation ignored stop signal");
                    handle.abort();
                }
            }
        }

        let mut leds = LedContext::lock(&self.leds);
        leds.off();
        leds.restore_ambient();
    }

    /// Run `effect` for a fixed blocking duration, then stop
    pub async fn run_preset(&mut self, effect: Effect, hold: Duration) {
        self.start(effect).await;
        sleep(hold).await;
        self.stop().await;
    }

    /// Show a steady color from the foreground
    pub async fn solid(&mut self, color: Rgb) {
        if self.active.is_some() {
            self.stop().await;
        }
        LedContext::lock(&self.leds).fill(color);
    }

    /// Show a color briefly, then switch off
    pub async fn flash(&mut self, color: Rgb, hold: Duration) {
        self.solid(color).await;
        sleep(hold).await;
        LedContext::lock(&self.leds).off();
    }
}

impl Drop for AnimationEngine {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::SeqCst);
            active.handle.abort();
        }
    }
}

async fn run_effect(effect: Effect, leds: SharedLeds, stop: Arc<AtomicBool>) {
    match effect {
        Effect::Breathe(color) => breathe(color, &leds, &stop).await,
        Effect::Rainbow => rainbow(&leds, &stop).await,
        Effect::Talking => talking(&leds, &stop).await,
        Effect::Strobe(color) => strobe(color, &leds, &stop).await,
        Effect::Sequence(steps) if steps.is_empty() => talking(&leds, &stop).await,
        Effect::Sequence(steps) => sequence(&steps, &leds, &stop).await,
    }
}

async fn breathe(color: Rgb, leds: &SharedLeds, stop: &AtomicBool) {
    let mut t = 0.0_f32;
    while !stop.load(Ordering::SeqCst) {
        {
            let mut ctx = LedContext::lock(leds);
            ctx.request_brightness(breathe_level(t));
            ctx.fill(color);
        }
        sleep(BREATHE_FRAME).await;
        t += 0.18;
    }
    LedContext::lock(leds).restore_ambient();
}

async fn rainbow(leds: &SharedLeds, stop: &AtomicBool) {
    let mut hue = 0_u32;
    while !stop.load(Ordering::SeqCst) {
        LedContext::lock(leds).fill(hsv_to_rgb((hue % 360) as f32, 1.0, 1.0));
        hue = hue.wrapping_add(7);
        sleep(RAINBOW_FRAME).await;
    }
}

async fn talking(leds: &SharedLeds, stop: &AtomicBool) {
    let mut t = 0.0_f32;
    while !stop.load(Ordering::SeqCst) {
        let (c0, c1) = talking_colors(t);
        LedContext::lock(leds).show(c0, c1);
        sleep(TALKING_FRAME).await;
        t += 0.32;
    }
}

async fn strobe(color: Rgb, leds: &SharedLeds, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        LedContext::lock(leds).fill(color);
        sleep(STROBE_PERIOD).await;
        LedContext::lock(leds).off();
        sleep(STROBE_PERIOD).await;
    }
}

async fn sequence(steps: &[AnimationStep], leds: &SharedLeds, stop: &AtomicBool) {
    'outer: while !stop.load(Ordering::SeqCst) {
        for step in steps {
            {
                let mut ctx = LedContext::lock(leds);
                match step.brightness {
                    StepBrightness::Level(level) => ctx.request_brightness(level),
                    StepBrightness::Inherit => ctx.restore_ambient(),
                }
                ctx.show(step.led0, step.led1);
            }
            if !hold(step.duration, stop).await {
                break 'outer;
            }
        }
    }
    LedContext::lock(leds).restore_ambient();
}

/// Sleep for `total` in short slices; false once the stop flag is seen
async fn hold(total: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(HOLD_SLICE);
        sleep(slice).await;
        remaining -= slice;
    }
    !stop.load(Ordering::SeqCst)
}

/// Brightness of the breathing pulse at phase `t`
pub fn breathe_level(t: f32) -> f32 {
    0.12 + 0.12 * (0.5 + 0.5 * t.sin())
}

/// Colors of the two pixels of the talking shimmer at phase `t`
pub fn talking_colors(t: f32) -> (Rgb, Rgb) {
    let a = 0.5 + 0.5 * t.sin();
    let b = 0.5 + 0.5 * (t + PI).sin();
    let level = |x: f32| (40.0 + 215.0 * x).round() as u8;
    (
        Rgb(level(a), level(b), 255),
        Rgb(level(b), level(a), 255),
    )
}

/// HSV to RGB; `hue` in degrees
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = value * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = value - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb(byte(r), byte(g), byte(b))
}
