//! Best-effort codec mixer setup
//!
//! Routes the WM8960 output mixers to the speaker and headphone, boosts the
//! LINPUT1/RINPUT1 microphone path and enables gentle automatic level
//! control. Every command may fail on other hardware; failures are logged.

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Shell commands applied in order
pub const WM8960_COMMANDS: &[&str] = &[
    "amixer -c 0 sset 'Left Output Mixer PCM' on",
    "amixer -c 0 sset 'Right Output Mixer PCM' on",
    "amixer -c 0 sset 'Headphone' 90% unmute 2>/dev/null || true",
    "amixer -c 0 sset 'Speaker' 90% unmute 2>/dev/null || true",
    "amixer -c 0 sset 'Left Input Boost Mixer LINPUT1' 2",
    "amixer -c 0 sset 'Right Input Boost Mixer RINPUT1' 2",
    "amixer -c 0 sset 'Left Input Mixer Boost' on",
    "amixer -c 0 sset 'Right Input Mixer Boost' on",
    "amixer -c 0 sset 'Capture' 47,47",
    "amixer -c 0 sset 'ADC PCM' 195,195",
    "amixer -c 0 sset 'ADC High Pass Filter' on",
    "amixer -c 0 sset 'ALC Function' Stereo",
    "amixer -c 0 sset 'ALC Target' 4",
    "amixer -c 0 sset 'ALC Max Gain' 7",
    "amixer -c 0 sset 'ALC Min Gain' 0",
    "amixer -c 0 sset 'ALC Attack' 2",
    "amixer -c 0 sset 'ALC Decay' 3",
    "amixer -c 0 sset 'ALC Hold Time' 0",
    "sudo alsactl store 2>/dev/null || true",
];

/// Run each command through `sh -c`; returns how many failed
pub async fn configure(commands: &[&str]) -> usize {
    info!(count = commands.len(), "mixer_config_start");
    let mut failed = 0;
    for cmd in commands {
        if !run_shell(cmd).await {
            failed += 1;
        }
    }
    info!(failed, "mixer_config_done");
    failed
}

async fn run_shell(cmd: &str) -> bool {
    match Command::new("sh").arg("-c").arg(cmd).output().await {
        Ok(out) => {
            debug!(
                cmd,
                rc = out.status.code(),
                stdout = %String::from_utf8_lossy(&out.stdout).trim(),
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "sh"
            );
            out.status.success()
        }
        Err(e) => {
            warn!(cmd, %e, "sh_error");
            false
        }
    }
}
