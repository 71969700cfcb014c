//! Built-in sound cues and the effect player

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::player::AudioPlayer;
use super::synth::{write_wav, ToneSegment, ToneSynth};
use crate::error::Result;

/// Rising triad sweep played once at boot
pub const STARTUP: &[ToneSegment] = &[
    ToneSegment::new(740.0, 550.0, 0.12, 0.35),
    ToneSegment::new(880.0, 660.0, 0.14, 0.38),
    ToneSegment::new(988.0, 740.0, 0.18, 0.40),
    ToneSegment::new(1175.0, 880.0, 0.22, 0.42),
];

/// Falling sweep played on shutdown
pub const OUTRO: &[ToneSegment] = &[
    ToneSegment::new(988.0, 740.0, 0.14, 0.35),
    ToneSegment::new(880.0, 660.0, 0.12, 0.33),
    ToneSegment::new(740.0, 550.0, 0.10, 0.30),
];

/// Recording started
pub const ACTIVATE: &[ToneSegment] = &[
    ToneSegment::new(1400.0, 1600.0, 0.090, 0.38),
    ToneSegment::new(1900.0, 2100.0, 0.080, 0.40),
];

/// Recording stopped
pub const RELEASE: &[ToneSegment] = &[
    ToneSegment::new(1100.0, 900.0, 0.070, 0.33),
    ToneSegment::new(800.0, 700.0, 0.060, 0.30),
];

/// Server response arrived
pub const RESPONSE: &[ToneSegment] = &[
    ToneSegment::new(1600.0, 1700.0, 0.060, 0.35),
    ToneSegment::new(2000.0, 1500.0, 0.080, 0.35),
    ToneSegment::new(1700.0, 1700.0, 0.050, 0.30),
];

/// Renders tone sequences to a scratch WAV and plays them
pub struct SoundEffects {
    synth: ToneSynth,
    player: Arc<dyn AudioPlayer>,
    scratch_dir: PathBuf,
    enabled: bool,
    counter: AtomicU64,
}

impl SoundEffects {
    pub fn new(
        synth: ToneSynth,
        player: Arc<dyn AudioPlayer>,
        scratch_dir: PathBuf,
        enabled: bool,
    ) -> Self {
        Self {
            synth,
            player,
            scratch_dir,
            enabled,
            counter: AtomicU64::new(0),
        }
    }

    pub fn player(&self) -> &Arc<dyn AudioPlayer> {
        &self.player
    }

    /// Play a built-in cue; failures are only logged
    pub async fn cue(&self, name: &'static str, segments: &[ToneSegment]) {
        if let Err(e) = self.play(segments).await {
            warn!(cue = name, %e, "sound cue failed");
        }
    }

    /// Synthesize and play `segments` when effects are enabled
    pub async fn play(&self, segments: &[ToneSegment]) -> Result<()> {
        if !self.enabled || segments.is_empty() {
            return Ok(());
        }

        let samples = self.synth.render(segments);
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.scratch_dir.join(format!(
            "sfx_{}_{seq}.wav",
            chrono::Utc::now().timestamp_millis()
        ));
        write_wav(&path, self.synth.sample_rate(), &samples)?;

        let result = self.player.play(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(?path, ?e, "scratch file not removed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::RecordingPlayer;

    #[tokio::test]
    async fn test_play_writes_and_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let player = Arc::new(RecordingPlayer::default());
        let sfx = SoundEffects::new(
            ToneSynth::new(8_000, 0.6),
            player.clone(),
            dir.path().to_path_buf(),
            true,
        );

        sfx.play(ACTIVATE).await.unwrap();
        let played = player.played();
        assert_eq!(played.len(), 1);
        assert!(played[0].file_name().unwrap().to_string_lossy().starts_with("sfx_"));
        assert!(!played[0].exists());
    }

    #[tokio::test]
    async fn test_disabled_effects_are_silent() {
        let dir = tempfile::tempdir().unwrap();
        let player = Arc::new(RecordingPlayer::default());
        let sfx = SoundEffects::new(
            ToneSynth::new(8_000, 0.6),
            player.clone(),
            dir.path().to_path_buf(),
            false,
        );

        sfx.cue("startup", STARTUP).await;
        assert!(player.played().is_empty());
    }
}
