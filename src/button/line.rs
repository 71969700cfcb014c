//! Digital input line for the push button
//!
//! The button is read by polling; the production line is a sysfs GPIO
//! value file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

/// A pollable push button
pub trait ButtonLine: Send {
    /// Sample the line; true while the button is held
    fn is_pressed(&mut self) -> io::Result<bool>;
}

/// Button on a sysfs GPIO line
pub struct SysfsButton {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsButton {
    /// Export the line if needed, set it as input and check it is readable
    pub fn open(root: &Path, line: u32, active_low: bool) -> io::Result<Self> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("GPIO root {} not found", root.display()),
            ));
        }

        let line_dir = root.join(format!("gpio{line}"));
        if !line_dir.exists() {
            fs::write(root.join("export"), line.to_string())?;
            // udev needs a moment to create the line directory
            for _ in 0..20 {
                if line_dir.exists() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }

        if let Err(e) = fs::write(line_dir.join("direction"), "in") {
            warn!(line, ?e, "could not set GPIO direction");
        }

        let mut button = Self {
            value_path: line_dir.join("value"),
            active_low,
        };
        let pressed = button.is_pressed()?;
        info!(line, active_low, pressed, "button line opened");
        Ok(button)
    }
}

impl ButtonLine for SysfsButton {
    fn is_pressed(&mut self) -> io::Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        decode_level(&raw, self.active_low)
    }
}

/// Interpret a sysfs line level
pub fn decode_level(raw: &str, active_low: bool) -> io::Result<bool> {
    let high = match raw.trim() {
        "1" => true,
        "0" => false,
        other => {
            debug!(value = other, "unexpected GPIO value");
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected GPIO value {other:?}"),
            ));
        }
    };
    Ok(high != active_low)
}

/// Button that follows a script of press windows on the tokio clock
#[cfg(test)]
pub struct ScriptedButton {
    origin: tokio::time::Instant,
    /// `[from_ms, to_ms)` windows during which the button is held
    presses: Vec<(u64, u64)>,
}

#[cfg(test)]
impl ScriptedButton {
    pub fn new(presses: &[(u64, u64)]) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            presses: presses.to_vec(),
        }
    }
}

#[cfg(test)]
impl ButtonLine for ScriptedButton {
    fn is_pressed(&mut self) -> io::Result<bool> {
        let t = self.origin.elapsed().as_millis() as u64;
        Ok(self.presses.iter().any(|(from, to)| (*from..*to).contains(&t)))
    }
}
