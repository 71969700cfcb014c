//! Execution of a normalized response as light and sound

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::parse::{LedPattern, ServerResponse, SpeechPayload};
use crate::error::{Error, Result};
use crate::feedback::Feedback;
use crate::leds::{AnimationStep, Effect, Rgb};
use crate::net::ActionEndpoint;
use crate::recording::retention;
use crate::sound::cues;

/// Hold for looping presets named by a response
const PRESET_HOLD: Duration = Duration::from_millis(1200);
/// Hold for steady colors named by a response
const COLOR_HOLD: Duration = Duration::from_millis(500);

const MAX_HINT_LEN: usize = 32;

/// Runs the actions of one response against the feedback devices
pub struct ResponseInterpreter {
    endpoint: Arc<dyn ActionEndpoint>,
    responses_dir: PathBuf,
    keep: usize,
}

impl ResponseInterpreter {
    pub fn new(endpoint: Arc<dyn ActionEndpoint>, responses_dir: PathBuf, keep: usize) -> Self {
        Self {
            endpoint,
            responses_dir,
            keep: keep.max(1),
        }
    }

    /// Run every action in `response`. Failures of one action are logged
    /// and do not prevent the others.
    pub async fn act(&self, response: &ServerResponse, fx: &mut Feedback) {
        let sequence = response.led_sequence.as_deref();
        let sequence_started = match sequence {
            Some(steps) => Some(start_sequence(steps, fx).await),
            None => None,
        };

        let mut spoke = false;
        if let Some(payload) = &response.speech {
            let hint = response.speech_text_hint.as_deref();
            match self.speak(payload, hint, fx, sequence.is_none()).await {
                Ok(path) => {
                    spoke = true;
                    info!(?path, "playback_done");
                }
                Err(e) => {
                    warn!(%e, "playback_error");
                    if e.is_serious() {
                        fx.error_strobe().await;
                        if let Some(steps) = sequence {
                            start_sequence(steps, fx).await;
                        }
                    }
                }
            }
        }

        match &response.sound_pattern {
            Some(segments) => {
                if let Err(e) = fx.sfx.play(segments).await {
                    warn!(%e, "sound_pattern_error");
                }
            }
            None if spoke => fx.sfx.cue("response", cues::RESPONSE).await,
            None => {}
        }

        match (sequence, sequence_started) {
            (Some(steps), Some(started)) => finish_sequence(steps, started, fx).await,
            _ => {
                if let Some(pattern) = response.led_pattern {
                    run_pattern(pattern, fx).await;
                }
            }
        }
    }

    /// Materialize the speech payload in the responses directory and play it
    async fn speak(
        &self,
        payload: &SpeechPayload,
        hint: Option<&str>,
        fx: &mut Feedback,
        animate: bool,
    ) -> Result<PathBuf> {
        let path = self.responses_dir.join(response_file_name(Utc::now(), hint));
        if let Err(e) = self.materialize(payload, &path).await {
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!(?path, "partial response file removed");
            }
            return Err(e);
        }
        retention::prune(&self.responses_dir, self.keep);

        if animate {
            fx.leds.start(Effect::Talking).await;
        }
        let played = fx.sfx.player().play(&path).await;
        if animate {
            fx.leds.stop().await;
        }
        played.map(|()| path)
    }

    async fn materialize(&self, payload: &SpeechPayload, path: &Path) -> Result<()> {
        match payload {
            SpeechPayload::Inline(encoded) => {
                let audio = decode_inline(encoded)?;
                debug!(bytes = audio.len(), "inline speech decoded");
                tokio::fs::write(path, audio).await?;
            }
            SpeechPayload::Remote(url) => {
                debug!(url, "fetching speech");
                self.endpoint.fetch(url, path).await?;
            }
        }
        Ok(())
    }
}

/// Base64 with any embedded whitespace removed
pub fn decode_inline(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let audio = STANDARD
        .decode(compact)
        .map_err(|e| Error::PayloadDecode(format!("speech is not base64: {e}")))?;
    if audio.is_empty() {
        return Err(Error::PayloadDecode("speech payload is empty".into()));
    }
    Ok(audio)
}

async fn start_sequence(steps: &[AnimationStep], fx: &mut Feedback) -> Instant {
    fx.leds.start(Effect::Sequence(steps.to_vec())).await;
    Instant::now()
}

/// Let the sequence finish at least one pass, then stop it
async fn finish_sequence(steps: &[AnimationStep], started: Instant, fx: &mut Feedback) {
    let pass: Duration = steps.iter().map(|s| s.duration).sum();
    let pass = if pass.is_zero() { PRESET_HOLD } else { pass };
    let elapsed = started.elapsed();
    if elapsed < pass {
        sleep(pass - elapsed).await;
    }
    fx.leds.stop().await;
}

async fn run_pattern(pattern: LedPattern, fx: &mut Feedback) {
    debug!(?pattern, "led pattern");
    match pattern {
        LedPattern::Rainbow => fx.leds.run_preset(Effect::Rainbow, PRESET_HOLD).await,
        LedPattern::Pulse => fx.leds.run_preset(Effect::Breathe(Rgb::AMBER), PRESET_HOLD).await,
        LedPattern::Error => fx.error_strobe().await,
        LedPattern::Ready => hold_color(Rgb::READY, fx).await,
        LedPattern::Neutral => hold_color(Rgb::WHITE, fx).await,
        LedPattern::Blip => hold_color(Rgb::CYAN, fx).await,
        LedPattern::Off => fx.leds.stop().await,
    }
}

async fn hold_color(color: Rgb, fx: &mut Feedback) {
    fx.leds.solid(color).await;
    sleep(COLOR_HOLD).await;
}

/// `resp_<UTC timestamp>_<hint>.wav` with the hint reduced to a safe stem
pub fn response_file_name(now: DateTime<Utc>, hint: Option<&str>) -> String {
    let stem: String = hint
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(MAX_HINT_LEN)
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "payload" } else { stem };
    format!("resp_{}_{stem}.wav", now.format("%Y%m%dT%H%M%S%3fZ"))
}
