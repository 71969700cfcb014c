//! LED strip capability and the shared brightness context
//!
//! The appliance drives two RGB pixels with a global brightness. The
//! context composes the brightness requested by whoever currently owns the
//! strip with the idle dimming scale.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// An RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const READY: Rgb = Rgb(0, 255, 0);
    pub const AMBER: Rgb = Rgb(255, 165, 0);
    pub const CONFIRM: Rgb = Rgb(0, 255, 60);
    pub const ERROR: Rgb = Rgb(255, 0, 30);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const CYAN: Rgb = Rgb(0, 180, 255);
}

/// Two-pixel strip with a global brightness
pub trait LedStrip: Send {
    fn set_pixels(&mut self, pixels: [Rgb; 2]) -> io::Result<()>;
    fn set_brightness(&mut self, level: f32) -> io::Result<()>;
}

/// APA102 ("DotStar") pair on a spidev node
pub struct DotStar {
    spi: File,
    pixels: [Rgb; 2],
    brightness: f32,
}

impl DotStar {
    /// Open the spidev node; a missing node is a startup configuration fault
    pub fn open(path: &Path, brightness: f32) -> io::Result<Self> {
        let spi = OpenOptions::new().write(true).open(path)?;
        let mut strip = Self {
            spi,
            pixels: [Rgb::OFF; 2],
            brightness,
        };
        strip.flush()?;
        Ok(strip)
    }

    fn flush(&mut self) -> io::Result<()> {
        let frame = encode_frame(&self.pixels, self.brightness);
        self.spi.write_all(&frame)
    }
}

impl LedStrip for DotStar {
    fn set_pixels(&mut self, pixels: [Rgb; 2]) -> io::Result<()> {
        self.pixels = pixels;
        self.flush()
    }

    fn set_brightness(&mut self, level: f32) -> io::Result<()> {
        self.brightness = level.clamp(0.0, 1.0);
        self.flush()
    }
}

/// Encode an APA102 frame: start frame, one word per pixel, end frame
pub fn encode_frame(pixels: &[Rgb], brightness: f32) -> Vec<u8> {
    let level = (brightness.clamp(0.0, 1.0) * 31.0).round() as u8;
    let mut frame = Vec::with_capacity(4 + pixels.len() * 4 + 4);
    frame.extend_from_slice(&[0, 0, 0, 0]);
    for Rgb(r, g, b) in pixels {
        frame.extend_from_slice(&[0xE0 | level, *b, *g, *r]);
    }
    frame.extend_from_slice(&[0xFF; 4]);
    frame
}

/// In-memory strip for tests
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStrip {
    state: Arc<Mutex<MemoryStripState>>,
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStripState {
    pub pixels: [Rgb; 2],
    pub brightness: f32,
    pub writes: usize,
    /// Every distinct pixel pair shown, in order
    pub history: Vec<[Rgb; 2]>,
}

#[cfg(test)]
impl MemoryStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryStripState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
impl LedStrip for MemoryStrip {
    fn set_pixels(&mut self, pixels: [Rgb; 2]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.history.last() != Some(&pixels) {
            state.history.push(pixels);
        }
        state.pixels = pixels;
        state.writes += 1;
        Ok(())
    }

    fn set_brightness(&mut self, level: f32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.brightness = level;
        state.writes += 1;
        Ok(())
    }
}

/// Device handle plus brightness state
pub struct LedContext {
    strip: Box<dyn LedStrip>,
    /// Baseline brightness restored after every animation
    ambient: f32,
    /// Brightness currently requested by the strip owner
    requested: f32,
    /// Idle dimming multiplier
    idle_scale: f32,
}

/// The context shared between the foreground loop and the active animation
pub type SharedLeds = Arc<Mutex<LedContext>>;

impl LedContext {
    pub fn new(strip: Box<dyn LedStrip>, ambient: f32) -> Self {
        let ambient = ambient.clamp(0.0, 1.0);
        let mut ctx = Self {
            strip,
            ambient,
            requested: ambient,
            idle_scale: 1.0,
        };
        ctx.apply_brightness();
        ctx
    }

    pub fn shared(strip: Box<dyn LedStrip>, ambient: f32) -> SharedLeds {
        Arc::new(Mutex::new(Self::new(strip, ambient)))
    }

    /// Lock a shared context, recovering from a poisoned lock
    pub fn lock(leds: &SharedLeds) -> MutexGuard<'_, LedContext> {
        leds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requested brightness times the idle scale
    pub fn effective_brightness(&self) -> f32 {
        (self.requested * self.idle_scale).clamp(0.0, 1.0)
    }

    pub fn show(&mut self, c0: Rgb, c1: Rgb) {
        if let Err(e) = self.strip.set_pixels([c0, c1]) {
            warn!(?e, "led write failed");
        }
    }

    pub fn fill(&mut self, color: Rgb) {
        self.show(color, color);
    }

    pub fn off(&mut self) {
        self.fill(Rgb::OFF);
    }

    pub fn request_brightness(&mut self, level: f32) {
        self.requested = level.clamp(0.0, 1.0);
        self.apply_brightness();
    }

    /// Return to the ambient brightness
    pub fn restore_ambient(&mut self) {
        self.request_brightness(self.ambient);
    }

    pub fn set_idle_scale(&mut self, scale: f32) {
        self.idle_scale = scale.clamp(0.0, 1.0);
        self.apply_brightness();
    }

    fn apply_brightness(&mut self) {
        let level = self.effective_brightness();
        debug!(level, "led brightness");
        if let Err(e) = self.strip.set_brightness(level) {
            warn!(?e, "led brightness write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&[Rgb(1, 2, 3), Rgb(4, 5, 6)], 1.0);
        assert_eq!(frame.len(), 16);
        assert_eq!(&frame[..4], &[0, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[0xFF, 3, 2, 1]);
        assert_eq!(&frame[8..12], &[0xFF, 6, 5, 4]);
        assert_eq!(&frame[12..], &[0xFF; 4]);
    }

    #[test]
    fn test_frame_brightness_is_five_bits() {
        let frame = encode_frame(&[Rgb::WHITE], 0.0);
        assert_eq!(frame[4], 0xE0);
        let frame = encode_frame(&[Rgb::WHITE], 0.5);
        assert_eq!(frame[4], 0xE0 | 16);
    }

    #[test]
    fn test_effective_brightness_composes() {
        let strip = MemoryStrip::new();
        let mut ctx = LedContext::new(Box::new(strip.clone()), 0.4);
        assert!((strip.snapshot().brightness - 0.4).abs() < 1e-6);

        ctx.set_idle_scale(0.5);
        assert!((ctx.effective_brightness() - 0.2).abs() < 1e-6);
        assert!((strip.snapshot().brightness - 0.2).abs() < 1e-6);

        ctx.request_brightness(0.8);
        assert!((strip.snapshot().brightness - 0.4).abs() < 1e-6);

        ctx.restore_ambient();
        assert!((strip.snapshot().brightness - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_history_skips_repeats() {
        let strip = MemoryStrip::new();
        let mut ctx = LedContext::new(Box::new(strip.clone()), 0.25);
        ctx.fill(Rgb::READY);
        ctx.fill(Rgb::READY);
        ctx.off();
        let state = strip.snapshot();
        assert_eq!(state.history, vec![[Rgb::READY; 2], [Rgb::OFF; 2]]);
    }
}
