//! Sound feedback: tone synthesis, built-in cues and file playback

pub mod cues;
mod player;
mod synth;

pub use cues::SoundEffects;
pub use player::Aplay;
#[cfg(test)]
pub use player::RecordingPlayer;
pub use synth::{ToneSegment, ToneSynth};
#[cfg(test)]
pub use synth::write_wav;
