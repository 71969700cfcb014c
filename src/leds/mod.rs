//! LED feedback: strip capability, animation engine and idle dimming

mod animation;
mod device;
mod idle;

pub use animation::{AnimationEngine, AnimationStep, Effect, StepBrightness};
pub use device::{DotStar, LedContext, Rgb};
#[cfg(test)]
pub use device::MemoryStrip;
pub use idle::IdleDimmer;
