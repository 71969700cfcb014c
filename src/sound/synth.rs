//! Stereo tone synthesis for UI sound effects
//!
//! Pure and deterministic: a list of tone segments becomes interleaved
//! 16-bit stereo PCM with click-free edges and a short silent spacer after
//! every segment.

use std::f64::consts::TAU;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{Error, Result};

/// Silence appended after every segment
pub const SPACER: Duration = Duration::from_millis(10);

/// Default fade-in/fade-out window
pub const DEFAULT_ATTACK: Duration = Duration::from_millis(8);

/// One stereo pure-tone slice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSegment {
    pub freq_left_hz: f32,
    pub freq_right_hz: f32,
    pub duration_secs: f32,
    /// 0..1 of full scale
    pub volume: f32,
}

impl ToneSegment {
    pub const fn new(freq_left_hz: f32, freq_right_hz: f32, duration_secs: f32, volume: f32) -> Self {
        Self {
            freq_left_hz,
            freq_right_hz,
            duration_secs,
            volume,
        }
    }

    /// Same frequency on both channels
    pub const fn mono(freq_hz: f32, duration_secs: f32, volume: f32) -> Self {
        Self::new(freq_hz, freq_hz, duration_secs, volume)
    }
}

/// Renders tone segments into PCM
#[derive(Debug, Clone)]
pub struct ToneSynth {
    sample_rate: u32,
    attack: Duration,
    volume_ceiling: f32,
}

impl ToneSynth {
    pub fn new(sample_rate: u32, volume_ceiling: f32) -> Self {
        Self {
            sample_rate,
            attack: DEFAULT_ATTACK,
            volume_ceiling: volume_ceiling.clamp(0.0, 1.0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame count of `secs` at the configured rate
    pub fn frames_for(&self, secs: f64) -> usize {
        (secs.max(0.0) * f64::from(self.sample_rate)).round() as usize
    }

    fn attack_frames(&self) -> usize {
        self.frames_for(self.attack.as_secs_f64())
    }

    /// Render `segments` into interleaved left/right samples
    pub fn render(&self, segments: &[ToneSegment]) -> Vec<i16> {
        let spacer = self.frames_for(SPACER.as_secs_f64());
        let total: usize = segments
            .iter()
            .map(|s| self.frames_for(f64::from(s.duration_secs)) + spacer)
            .sum();

        let mut out = Vec::with_capacity(total * 2);
        for segment in segments {
            self.render_segment(segment, &mut out);
            out.resize(out.len() + spacer * 2, 0);
        }
        out
    }

    fn render_segment(&self, segment: &ToneSegment, out: &mut Vec<i16>) {
        let frames = self.frames_for(f64::from(segment.duration_secs));
        let volume = f64::from(segment.volume.clamp(0.0, self.volume_ceiling));
        let amplitude = volume * f64::from(i16::MAX);
        let rate = f64::from(self.sample_rate);
        let left = f64::from(segment.freq_left_hz.max(0.0));
        let right = f64::from(segment.freq_right_hz.max(0.0));

        let attack = self.attack_frames();
        let shaped = attack > 0 && frames >= 2 * attack;

        for i in 0..frames {
            let envelope = if !shaped {
                1.0
            } else if i < attack {
                i as f64 / attack as f64
            } else if i >= frames - attack {
                (frames - 1 - i) as f64 / attack as f64
            } else {
                1.0
            };
            let t = i as f64 / rate;
            let gain = amplitude * envelope;
            out.push((gain * (TAU * left * t).sin()).round() as i16);
            out.push((gain * (TAU * right * t).sin()).round() as i16);
        }
    }
}

/// Write interleaved stereo samples as a 16-bit PCM WAV file
pub fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(wav_error)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)
}

fn wav_error(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(e) => Error::Device(e),
        other => Error::PayloadDecode(other.to_string()),
    }
}
