//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Appliance configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// ALSA device used for both capture and playback
    pub audio_device: String,
    /// Capture and synthesis sample rate in Hz
    pub sample_rate: u32,
    /// Capture channel count
    pub channels: u16,

    /// Directory for timestamped captures
    pub recordings_dir: PathBuf,
    /// Directory for decoded or fetched speech payloads
    pub responses_dir: PathBuf,
    /// Maximum number of files kept in each of the two directories
    pub keep_files: usize,
    /// Scratch directory for synthesized effect files
    pub scratch_dir: PathBuf,
    /// Append-only JSON event log
    pub log_path: PathBuf,

    /// Remote action endpoint
    pub endpoint: String,
    /// Identifier sent with every upload
    pub device_id: String,
    /// Upload and audio fetch timeout
    pub request_timeout: Duration,
    /// Host probed by the startup liveness gate
    pub net_host: String,
    pub net_port: u16,

    /// Button line number
    pub gpio_line: u32,
    /// Root of the sysfs GPIO tree
    pub gpio_root: PathBuf,
    pub button_active_low: bool,
    /// Window for the second tap of a double-tap
    pub double_tap: Duration,

    /// spidev node driving the LED pair
    pub led_spi: PathBuf,
    /// Ambient LED brightness
    pub led_brightness: f32,
    /// Ceiling for per-step brightness in server sequences
    pub sequence_brightness_max: f32,
    /// Idle interval after which brightness halves
    pub idle_dim: Duration,
    /// Idle scale below which LEDs switch fully off
    pub idle_off_below: f32,

    pub sfx_enabled: bool,
    /// Ceiling for tone volumes before synthesis
    pub sfx_max_volume: f32,
    pub mixer_init: bool,
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;
        let home = PathBuf::from(home);

        let recordings_dir = lookup("SS_RECS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("recs"));
        let responses_dir = lookup("SS_RESPONSES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| recordings_dir.join("responses"));
        let log_path = lookup("SS_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("safetyscribeos").join("ssos.log"));
        let shm = Path::new("/dev/shm");
        let scratch_dir = if shm.exists() {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        };

        Ok(Self {
            audio_device: lookup("SS_AUDIO_DEV").unwrap_or_else(|| "plughw:0,0".into()),
            sample_rate: parse(&lookup, "SS_RATE", 48_000)?,
            channels: parse(&lookup, "SS_CH", 2)?,
            recordings_dir,
            responses_dir,
            keep_files: parse(&lookup, "SS_KEEP", 50)?,
            scratch_dir,
            log_path,
            endpoint: lookup("SS_ENDPOINT")
                .unwrap_or_else(|| "https://n8n.codemusic.ca/webhook/safetyscribe".into()),
            device_id: lookup("SS_DEVICE_ID").unwrap_or_else(|| "SafetyScribe-PiZeroW".into()),
            request_timeout: Duration::from_secs(parse(&lookup, "SS_TIMEOUT_SECS", 90)?),
            net_host: lookup("SS_NET_HOST").unwrap_or_else(|| "n8n.codemusic.ca".into()),
            net_port: parse(&lookup, "SS_NET_PORT", 443)?,
            gpio_line: parse(&lookup, "SS_GPIO", 17)?,
            gpio_root: lookup("SS_GPIO_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/sys/class/gpio")),
            button_active_low: flag(&lookup, "SS_BUTTON_ACTIVE_LOW", true),
            double_tap: Duration::from_millis(parse(&lookup, "SS_DOUBLE_TAP_MS", 400)?),
            led_spi: lookup("SS_LED_SPI")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/dev/spidev0.0")),
            led_brightness: parse_unit(&lookup, "SS_LED_BRIGHTNESS", 0.25)?,
            sequence_brightness_max: parse_unit(&lookup, "SS_SEQ_BRIGHTNESS_MAX", 0.6)?,
            idle_dim: Duration::from_secs(parse(&lookup, "SS_IDLE_DIM_SECS", 60)?),
            idle_off_below: parse_unit(&lookup, "SS_IDLE_OFF_BELOW", 0.05)?,
            sfx_enabled: flag(&lookup, "SS_SFX", true),
            sfx_max_volume: parse_unit(&lookup, "SS_SFX_MAX_VOL", 0.6)?,
            mixer_init: flag(&lookup, "SS_MIXER_INIT", true),
            debug: flag(&lookup, "DEBUG", false),
        })
    }

    /// Ensure output directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        std::fs::create_dir_all(&self.responses_dir)?;
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| v.trim() == "1")
}

/// A finite fraction clamped into `[0, 1]`
fn parse_unit<F>(lookup: &F, key: &str, default: f32) -> Result<f32>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f32 = parse(lookup, key, default)?;
    if !value.is_finite() {
        bail!("invalid value for {key}: {value} is not finite");
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/pi")])).unwrap();
        assert_eq!(config.recordings_dir, PathBuf::from("/home/pi/recs"));
        assert_eq!(config.responses_dir, PathBuf::from("/home/pi/recs/responses"));
        assert_eq!(config.double_tap, Duration::from_millis(400));
        assert_eq!(config.sample_rate, 48_000);
        assert!(config.sfx_enabled);
        assert!(!config.debug);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/pi"),
            ("SS_RATE", "16000"),
            ("SS_SFX", "0"),
            ("DEBUG", "1"),
            ("SS_LED_BRIGHTNESS", "3.0"),
        ]))
        .unwrap();
        assert_eq!(config.sample_rate, 16_000);
        assert!(!config.sfx_enabled);
        assert!(config.debug);
        assert_eq!(config.led_brightness, 1.0);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("HOME", "/h"), ("SS_GPIO", "seventeen")]))
            .unwrap_err();
        assert!(err.to_string().contains("SS_GPIO"));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        for (key, raw) in [
            ("SS_SFX_MAX_VOL", "NaN"),
            ("SS_SEQ_BRIGHTNESS_MAX", "nan"),
            ("SS_IDLE_OFF_BELOW", "inf"),
            ("SS_LED_BRIGHTNESS", "-infinity"),
        ] {
            let err = Config::from_lookup(lookup_from(&[("HOME", "/h"), (key, raw)]))
                .unwrap_err();
            assert!(err.to_string().contains(key), "{key}={raw}: {err}");
        }
    }
}
