//! Audio capture: external recorder process, session lifecycle and retention

mod capture;
pub mod retention;
mod session;

pub use capture::{Arecord, CaptureBackend};
#[cfg(test)]
pub use capture::{FakeCapture, FakeOutput};
pub use session::RecordingSession;
