//! Fault taxonomy for the appliance
//!
//! Every runtime fault is one of these kinds. Only configuration faults may
//! stop the process, and only before the main loop starts.

use std::io;

/// Result alias used across the appliance modules
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by devices, audio processes and the remote endpoint
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Capture/playback executable missing or audio device busy
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Connect failure, timeout or non-2xx status during upload or fetch
    #[error("network failure: {0}")]
    Network(String),

    /// Malformed base64, unreadable audio or unparseable response field
    #[error("payload decode failure: {0}")]
    PayloadDecode(String),

    /// Read/write failure on a device node or output file
    #[error("device I/O: {0}")]
    Device(#[from] io::Error),

    /// Missing device path or malformed setting at startup
    #[error("configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Serious faults are shown with the red strobe; the rest are skipped
    /// silently and the device stays ready.
    pub fn is_serious(&self) -> bool {
        !matches!(self, Error::PayloadDecode(_))
    }

    /// Map a failed process spawn to the matching fault kind
    pub fn from_spawn(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => {
                Error::HardwareUnavailable(format!("{program} not found"))
            }
            io::ErrorKind::PermissionDenied => {
                Error::HardwareUnavailable(format!("{program} not executable"))
            }
            _ => Error::Device(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failures_are_not_serious() {
        assert!(!Error::PayloadDecode("bad base64".into()).is_serious());
        assert!(Error::Network("timeout".into()).is_serious());
        assert!(Error::HardwareUnavailable("aplay".into()).is_serious());
    }

    #[test]
    fn test_missing_program_is_hardware_unavailable() {
        let err = Error::from_spawn("arecord", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, Error::HardwareUnavailable(ref m) if m.contains("arecord")));

        let err = Error::from_spawn("arecord", io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(err, Error::Device(_)));
    }
}
