//! Normalization of the untrusted upload response
//!
//! Every field is optional and type-checked on its own. A field with an
//! unexpected type is treated as absent without affecting its siblings,
//! and malformed entries inside lists are skipped.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::leds::{AnimationStep, Rgb, StepBrightness};
use crate::sound::ToneSegment;

/// Most sequence steps taken from one response
pub const MAX_SEQUENCE_STEPS: usize = 64;
/// Most tone segments taken from one response
pub const MAX_SOUND_SEGMENTS: usize = 32;

const MIN_STEP_SECS: f64 = 0.03;
const MAX_STEP_SECS: f64 = 2.0;
const DEFAULT_STEP_SECS: f64 = 0.25;

const MAX_SEGMENT_SECS: f64 = 2.0;
const MAX_FREQ_HZ: f64 = 20_000.0;
const DEFAULT_FREQ_HZ: f64 = 1000.0;
const DEFAULT_SEGMENT_SECS: f64 = 0.08;
const DEFAULT_VOLUME: f64 = 0.35;

const PATTERN_KEYS: &[&str] = &["led", "led_pattern", "pattern"];
const STEP_COLOR_KEYS: &[&str] = &["led0", "color", "c0"];
const STEP_SECOND_COLOR_KEYS: &[&str] = &["led1", "c1"];
const SOUND_KEYS: &[&str] = &["sound_pattern", "sound"];
const HINT_KEYS: &[&str] = &["speak_text", "reply_text"];
const FREQ_KEYS: &[&str] = &["fL", "f", "frequency", "freq"];
const DURATION_KEYS: &[&str] = &["d", "dur", "duration"];
const VOLUME_KEYS: &[&str] = &["v", "vol", "volume"];

/// Built-in LED patterns a response may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    Rainbow,
    Pulse,
    Ready,
    Error,
    Neutral,
    Off,
    /// Any unrecognized name: a short cyan blip
    Blip,
}

impl LedPattern {
    /// Map a pattern name; blank names mean no pattern
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let pattern = match name.as_str() {
            "" => return None,
            "rainbow" | "record_rainbow" | "recording" => LedPattern::Rainbow,
            "pulse" | "breathe" | "orange" | "wait" | "waiting" => LedPattern::Pulse,
            "green" | "ok" | "ready" => LedPattern::Ready,
            "red" | "error" | "warn" => LedPattern::Error,
            "white" | "neutral" => LedPattern::Neutral,
            "off" | "none" => LedPattern::Off,
            _ => LedPattern::Blip,
        };
        Some(pattern)
    }
}

/// Where the spoken reply comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechPayload {
    /// Base64 audio, data-URI prefix already removed
    Inline(String),
    /// Absolute http(s) URL to fetch
    Remote(String),
}

/// Ceilings applied while parsing
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub brightness_cap: f32,
    pub volume_cap: f32,
}

/// The actions requested by one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerResponse {
    pub led_pattern: Option<LedPattern>,
    /// Steps sorted by declared index; may be empty
    pub led_sequence: Option<Vec<AnimationStep>>,
    pub sound_pattern: Option<Vec<ToneSegment>>,
    pub speech: Option<SpeechPayload>,
    pub speech_text_hint: Option<String>,
}

impl ServerResponse {
    /// Normalize an arbitrary JSON body. Lists use their first object
    /// element; anything that is not an object yields no actions.
    pub fn from_value(body: &Value, limits: &ParseLimits) -> Self {
        let object = match body {
            Value::Object(map) => Some(map),
            Value::Array(items) => items.iter().find_map(Value::as_object),
            _ => None,
        };
        match object {
            Some(map) => Self::from_map(map, limits),
            None => Self::default(),
        }
    }

    fn from_map(map: &Map<String, Value>, limits: &ParseLimits) -> Self {
        Self {
            led_pattern: first_string(map, PATTERN_KEYS).and_then(LedPattern::from_name),
            led_sequence: map
                .get("led_sequence")
                .and_then(Value::as_array)
                .map(|items| parse_sequence(items, limits.brightness_cap)),
            sound_pattern: lookup(map, SOUND_KEYS)
                .and_then(Value::as_array)
                .map(|items| parse_sound(items, limits.volume_cap))
                .filter(|segments| !segments.is_empty()),
            speech: parse_speech(map),
            speech_text_hint: first_string(map, HINT_KEYS).map(str::to_string),
        }
    }

    pub fn has_actions(&self) -> bool {
        self.led_pattern.is_some()
            || self.led_sequence.is_some()
            || self.sound_pattern.is_some()
            || self.speech.is_some()
    }
}

/// First present, non-null value among `keys`
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

/// First non-blank string among `keys`; other types are skipped
fn first_string<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// A finite number, or a string holding one
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// A number field: default when absent, `None` when present but invalid
fn number_or(map: &Map<String, Value>, keys: &[&str], default: f64) -> Option<f64> {
    match lookup(map, keys) {
        Some(value) => number(value),
        None => Some(default),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColor {
    Triple([f64; 3]),
    Channels { r: f64, g: f64, b: f64 },
}

fn parse_color(value: &Value) -> Option<Rgb> {
    let [r, g, b] = match serde_json::from_value::<RawColor>(value.clone()).ok()? {
        RawColor::Triple(rgb) => rgb,
        RawColor::Channels { r, g, b } => [r, g, b],
    };
    let channel = |c: f64| c.round().clamp(0.0, 255.0) as u8;
    Some(Rgb(channel(r), channel(g), channel(b)))
}

fn parse_sequence(items: &[Value], brightness_cap: f32) -> Vec<AnimationStep> {
    let mut steps: Vec<AnimationStep> = items
        .iter()
        .take(MAX_SEQUENCE_STEPS)
        .enumerate()
        .filter_map(|(position, item)| parse_step(position, item, brightness_cap))
        .collect();
    steps.sort_by_key(|step| step.index);
    steps
}

fn parse_step(position: usize, item: &Value, brightness_cap: f32) -> Option<AnimationStep> {
    let map = item.as_object()?;

    let index = match map.get("step").filter(|v| !v.is_null()) {
        Some(value) => value.as_i64().or_else(|| number(value).map(|n| n as i64))?,
        None => position as i64,
    };
    let secs = number_or(map, &["duration"], DEFAULT_STEP_SECS)?.clamp(MIN_STEP_SECS, MAX_STEP_SECS);
    let brightness = match lookup(map, &["brightness"]) {
        Some(value) => {
            StepBrightness::Level((number(value)? as f32).clamp(0.0, brightness_cap))
        }
        None => StepBrightness::Inherit,
    };
    let led0 = parse_color(lookup(map, STEP_COLOR_KEYS)?)?;
    let led1 = match lookup(map, STEP_SECOND_COLOR_KEYS) {
        Some(value) => parse_color(value)?,
        None => led0,
    };

    Some(AnimationStep {
        index,
        duration: Duration::from_secs_f64(secs),
        brightness,
        led0,
        led1,
    })
}

fn parse_sound(items: &[Value], volume_cap: f32) -> Vec<ToneSegment> {
    items
        .iter()
        .take(MAX_SOUND_SEGMENTS)
        .filter_map(|item| parse_tone(item, volume_cap))
        .collect()
}

fn parse_tone(item: &Value, volume_cap: f32) -> Option<ToneSegment> {
    let map = item.as_object()?;
    let left = number_or(map, FREQ_KEYS, DEFAULT_FREQ_HZ)?;
    let right = number_or(map, &["fR"], left)?;
    let secs = number_or(map, DURATION_KEYS, DEFAULT_SEGMENT_SECS)?;
    let volume = number_or(map, VOLUME_KEYS, DEFAULT_VOLUME)?;

    Some(ToneSegment::new(
        left.clamp(0.0, MAX_FREQ_HZ) as f32,
        right.clamp(0.0, MAX_FREQ_HZ) as f32,
        secs.clamp(0.0, MAX_SEGMENT_SECS) as f32,
        (volume as f32).clamp(0.0, volume_cap),
    ))
}

/// Inline `speak` beats `audio_url`, which beats a sniffed `audio` field
fn parse_speech(map: &Map<String, Value>) -> Option<SpeechPayload> {
    if let Some(inline) = first_string(map, &["speak"]) {
        return Some(SpeechPayload::Inline(strip_data_uri(inline).to_string()));
    }
    if let Some(url) = first_string(map, &["audio_url"]) {
        return Some(SpeechPayload::Remote(url.to_string()));
    }
    let audio = first_string(map, &["audio"])?;
    if is_remote(audio) {
        Some(SpeechPayload::Remote(audio.to_string()))
    } else {
        Some(SpeechPayload::Inline(strip_data_uri(audio).to_string()))
    }
}

fn is_remote(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// `data:audio/<type>;base64,<payload>` to `<payload>`; other input as is
pub fn strip_data_uri(s: &str) -> &str {
    s.strip_prefix("data:audio/")
        .and_then(|rest| rest.split_once(";base64,"))
        .filter(|(mime, payload)| !mime.is_empty() && !mime.contains(';') && !payload.is_empty())
        .map_or(s, |(_, payload)| payload)
}
