//! State machine module for gesture classification
//!
//! Provides an explicit state machine with four states:
//! - Idle: Default state, no recording
//! - PttActive: Recording while the button is held
//! - DoubleTapArmed: One tap seen, waiting for a second
//! - ToggleRecording: Recording after a double-tap, until the next double-tap

mod machine;

pub use machine::{InputEvent, InputStateMachine};
