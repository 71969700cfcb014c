//! Synchronous audio file playback through an external player process

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Plays an audio file to completion
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, path: &Path) -> Result<()>;
}

/// `aplay` on a fixed ALSA device
pub struct Aplay {
    device: String,
}

impl Aplay {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[async_trait]
impl AudioPlayer for Aplay {
    async fn play(&self, path: &Path) -> Result<()> {
        let output = Command::new("aplay")
            .arg("-D")
            .arg(&self.device)
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::from_spawn("aplay", e))?;

        debug!(?path, status = ?output.status, "aplay finished");
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(exit_error(&output.status.to_string(), &stderr))
        }
    }
}

/// Classify a failed `aplay` run by its diagnostics
fn exit_error(status: &str, stderr: &str) -> Error {
    let detail = stderr.lines().map(str::trim).find(|l| !l.is_empty());
    let message = match detail {
        Some(line) => format!("aplay exited with {status}: {line}"),
        None => format!("aplay exited with {status}"),
    };
    if stderr.contains("Device or resource busy") || stderr.contains("No such device") {
        Error::HardwareUnavailable(message)
    } else {
        Error::PayloadDecode(message)
    }
}

/// Test player that records what it was asked to play
#[cfg(test)]
#[derive(Default)]
pub struct RecordingPlayer {
    played: std::sync::Mutex<Vec<(std::path::PathBuf, Option<u64>)>>,
    duration: std::time::Duration,
    fail: bool,
}

#[cfg(test)]
impl RecordingPlayer {
    /// Each playback takes `duration` of (virtual) time
    pub fn with_duration(duration: std::time::Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<std::path::PathBuf> {
        self.entries().into_iter().map(|(path, _)| path).collect()
    }

    /// Played paths with the file size seen at playback time
    pub fn entries(&self) -> Vec<(std::path::PathBuf, Option<u64>)> {
        self.played.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, path: &Path) -> Result<()> {
        let size = std::fs::metadata(path).map(|m| m.len()).ok();
        self.played.lock().unwrap().push((path.to_path_buf(), size));
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        if self.fail {
            return Err(Error::PayloadDecode("unplayable".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_device_is_hardware_unavailable() {
        let stderr = "aplay: main:831: audio open error: Device or resource busy\n";
        let err = exit_error("exit status: 1", stderr);
        assert!(matches!(err, Error::HardwareUnavailable(ref m) if m.contains("busy")));
        assert!(err.is_serious());
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let stderr = "aplay: test_wavefile:1131: can't play WAVE-files with sample 64 bits wide\n";
        let err = exit_error("exit status: 1", stderr);
        assert!(matches!(err, Error::PayloadDecode(_)));
        assert!(!err.is_serious());

        let err = exit_error("exit status: 1", "");
        assert_eq!(err.to_string(), "payload decode failure: aplay exited with exit status: 1");
    }
}
