//! External capture process
//!
//! Capture runs as a separate OS process writing PCM WAV to a path. Stopping
//! sends SIGTERM, waits out a grace period, then escalates to SIGKILL.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::debug;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// How a capture process ended
#[derive(Debug, Clone, Default)]
pub struct CaptureExit {
    pub code: Option<i32>,
    /// The grace period expired and the process was killed
    pub forced: bool,
    pub stderr: String,
}

/// Starts capture processes
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn spawn(&self, path: &Path) -> Result<Box<dyn CaptureProcess>>;
}

/// A running capture
#[async_trait]
pub trait CaptureProcess: Send {
    async fn stop(self: Box<Self>, grace: Duration) -> Result<CaptureExit>;
}

/// `arecord` writing 16-bit little-endian PCM
pub struct Arecord {
    device: String,
    sample_rate: u32,
    channels: u16,
}

impl Arecord {
    pub fn new(device: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            device: device.into(),
            sample_rate,
            channels,
        }
    }
}

#[async_trait]
impl CaptureBackend for Arecord {
    async fn spawn(&self, path: &Path) -> Result<Box<dyn CaptureProcess>> {
        let child = Command::new("arecord")
            .arg("-D")
            .arg(&self.device)
            .args(["-f", "S16_LE"])
            .arg("-c")
            .arg(self.channels.to_string())
            .arg("-r")
            .arg(self.sample_rate.to_string())
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::from_spawn("arecord", e))?;

        debug!(pid = child.id(), ?path, "arecord spawned");
        Ok(Box::new(ArecordProcess { child }))
    }
}

struct ArecordProcess {
    child: Child,
}

/// Bound on reaping after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
impl CaptureProcess for ArecordProcess {
    async fn stop(mut self: Box<Self>, grace: Duration) -> Result<CaptureExit> {
        terminate(&mut self.child)?;

        let mut forced = false;
        let status = match timeout(grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                forced = true;
                self.child.start_kill()?;
                timeout(REAP_TIMEOUT, self.child.wait())
                    .await
                    .map_err(|_| Error::HardwareUnavailable("arecord did not exit".into()))??
            }
        };

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = timeout(Duration::from_millis(200), pipe.read_to_string(&mut stderr)).await;
        }

        Ok(CaptureExit {
            code: status.code(),
            forced,
            stderr: stderr.trim().to_string(),
        })
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped
        return Ok(());
    };
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Device(std::io::Error::other(e))),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<()> {
    child.start_kill()?;
    Ok(())
}

#[cfg(test)]
pub use fake::{FakeCapture, FakeOutput};
