//! Light and sound feedback used by the foreground loop

use std::time::Duration;

use crate::leds::{AnimationEngine, Effect, Rgb};
use crate::sound::SoundEffects;

/// How long transient error and preset animations run
pub const ERROR_HOLD: Duration = Duration::from_millis(800);

/// Animation engine plus sound effects
pub struct Feedback {
    pub leds: AnimationEngine,
    pub sfx: SoundEffects,
}

impl Feedback {
    pub fn new(leds: AnimationEngine, sfx: SoundEffects) -> Self {
        Self { leds, sfx }
    }

    /// Red strobe for a fixed duration
    pub async fn error_strobe(&mut self) {
        self.leds.run_preset(Effect::Strobe(Rgb::ERROR), ERROR_HOLD).await;
    }

    /// Solid green: idle and healthy
    pub async fn ready(&mut self) {
        self.leds.solid(Rgb::READY).await;
    }
}
