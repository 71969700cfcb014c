//! Lifecycle of one capture
//!
//! A session owns the running capture process from `start` until `stop`.
//! The capture file outlives the session and is pruned by retention.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::capture::{CaptureBackend, CaptureProcess};
use super::retention;
use crate::feedback::Feedback;
use crate::leds::{Effect, Rgb};
use crate::sound::cues;

/// Grace period between SIGTERM and SIGKILL
pub const STOP_GRACE: Duration = Duration::from_secs(3);

/// Confirmation flash after a capture stops
const CONFIRM_FLASH: Duration = Duration::from_millis(250);

/// Files this small hold a WAV header and no audio
const WAV_HEADER_LEN: u64 = 44;

struct ActiveCapture {
    path: PathBuf,
    process: Box<dyn CaptureProcess>,
    started_at: Instant,
}

/// Owner of the single capture process
pub struct RecordingSession {
    backend: Arc<dyn CaptureBackend>,
    dir: PathBuf,
    keep: usize,
    active: Option<ActiveCapture>,
}

impl RecordingSession {
    pub fn new(backend: Arc<dyn CaptureBackend>, dir: PathBuf, keep: usize) -> Self {
        Self {
            backend,
            dir,
            keep: keep.max(1),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin capturing into a fresh timestamped file.
    ///
    /// Returns false when no capture is running afterwards; the caller must
    /// not treat that as an active recording.
    pub async fn start(&mut self, fx: &mut Feedback) -> bool {
        if self.active.is_some() {
            warn!("capture already running");
            return true;
        }

        let path = self.dir.join(capture_file_name(chrono::Utc::now()));
        info!(?path, "arecord_start");

        match self.backend.spawn(&path).await {
            Ok(process) => {
                self.active = Some(ActiveCapture {
                    path,
                    process,
                    started_at: Instant::now(),
                });
                fx.leds.start(Effect::Rainbow).await;
                fx.sfx.cue("activate", cues::ACTIVATE).await;
                true
            }
            Err(e) => {
                error!(%e, "arecord_not_started");
                fx.error_strobe().await;
                false
            }
        }
    }

    /// Stop the capture and return its file when it holds audio
    pub async fn stop(&mut self, fx: &mut Feedback) -> Option<PathBuf> {
        let active = self.active.take()?;
        let held_ms = active.started_at.elapsed().as_millis() as u64;

        let outcome = active.process.stop(STOP_GRACE).await;

        fx.leds.stop().await;
        fx.leds.flash(Rgb::CONFIRM, CONFIRM_FLASH).await;
        fx.sfx.cue("release", cues::RELEASE).await;

        match outcome {
            Ok(exit) => info!(
                code = exit.code,
                forced = exit.forced,
                stderr = %exit.stderr,
                held_ms,
                "arecord_stop"
            ),
            Err(e) => warn!(%e, held_ms, "arecord_stop"),
        }

        retention::prune(&self.dir, self.keep);

        if has_audio(&active.path) {
            Some(active.path)
        } else {
            warn!(path = ?active.path, "no_wav_generated");
            None
        }
    }

    /// Stop any capture without feedback, keeping its file
    pub async fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            warn!(path = ?active.path, "capture aborted");
            if let Err(e) = active.process.stop(STOP_GRACE).await {
                warn!(%e, "capture abort failed");
            }
        }
    }
}

fn capture_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("rec_{}.wav", now.format("%Y%m%dT%H%M%S%3fZ"))
}

fn has_audio(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > WAV_HEADER_LEN)
        .unwrap_or(false)
}
