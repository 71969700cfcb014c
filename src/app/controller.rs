//! Foreground control loop
//!
//! One tick samples the button, advances the gesture machine, runs any
//! recording/upload/response work the gesture implies and updates idle
//! dimming. Ticks are supervised: an error or panic inside one is logged,
//! shown as the red strobe and followed by a reset to a safe idle state.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::button::ButtonLine;
use crate::config::Config;
use crate::error::Result;
use crate::events::Gesture;
use crate::feedback::Feedback;
use crate::leds::{IdleDimmer, Rgb};
use crate::net::ActionEndpoint;
use crate::recording::{CaptureBackend, RecordingSession};
use crate::response::{ParseLimits, ResponseInterpreter, ServerResponse};
use crate::sound::cues;
use crate::state::{InputEvent, InputStateMachine};

/// Loop period between button samples
pub const TICK: Duration = Duration::from_millis(30);
/// Delay before re-sampling a fresh press
pub const DEBOUNCE: Duration = Duration::from_millis(30);

/// The appliance: button in, recording out, response rendered
pub struct Appliance {
    button: Box<dyn ButtonLine>,
    machine: InputStateMachine,
    idle: IdleDimmer,
    session: RecordingSession,
    endpoint: Arc<dyn ActionEndpoint>,
    interpreter: ResponseInterpreter,
    limits: ParseLimits,
    fx: Feedback,
    origin: Instant,
}

impl Appliance {
    pub fn new(
        config: &Config,
        button: Box<dyn ButtonLine>,
        fx: Feedback,
        capture: Arc<dyn CaptureBackend>,
        endpoint: Arc<dyn ActionEndpoint>,
    ) -> Self {
        Self {
            button,
            machine: InputStateMachine::new(config.double_tap),
            idle: IdleDimmer::new(
                config.idle_dim,
                config.idle_off_below,
                Instant::now(),
            ),
            session: RecordingSession::new(
                capture,
                config.recordings_dir.clone(),
                config.keep_files,
            ),
            interpreter: ResponseInterpreter::new(
                Arc::clone(&endpoint),
                config.responses_dir.clone(),
                config.keep_files,
            ),
            endpoint,
            limits: ParseLimits {
                brightness_cap: config.sequence_brightness_max,
                volume_cap: config.sfx_max_volume,
            },
            fx,
            origin: Instant::now(),
        }
    }

    /// Run supervised ticks forever
    pub async fn run(&mut self) {
        loop {
            let outcome = AssertUnwindSafe(self.tick()).catch_unwind().await;
            let fault = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(fault) = fault {
                self.recover(&fault).await;
            }
            sleep(TICK).await;
        }
    }

    /// One loop iteration
    pub async fn tick(&mut self) -> Result<()> {
        let timestamp_ms = self.origin.elapsed().as_millis() as u64;
        let pressed = self.button.is_pressed()?;
        let confirmed = if self.machine.needs_debounce(pressed) {
            sleep(DEBOUNCE).await;
            self.button.is_pressed()?
        } else {
            false
        };

        let transition = self.machine.advance(
            InputEvent {
                pressed,
                timestamp_ms,
            },
            confirmed,
        );
        if transition.rising_edge {
            self.idle.record_interaction(Instant::now(), self.fx.leds.leds());
        }
        if let Some(gesture) = transition.gesture {
            self.on_gesture(gesture).await;
        }

        self.idle.tick(Instant::now(), self.fx.leds.leds());
        Ok(())
    }

    async fn on_gesture(&mut self, gesture: Gesture) {
        info!(detail = %gesture, "{}", gesture.log_name());

        if gesture.starts_recording() {
            if !self.session.start(&mut self.fx).await {
                self.machine.reset();
                self.show_ready().await;
            }
            return;
        }

        match self.session.stop(&mut self.fx).await {
            Some(path) => self.upload_and_act(&path).await,
            None => self.show_ready().await,
        }
    }

    /// Upload a finished recording and render the reply
    async fn upload_and_act(&mut self, path: &Path) {
        self.fx.leds.solid(Rgb::AMBER).await;

        match self.endpoint.upload(path).await {
            Ok(body) => {
                info!(?path, "upload_ok");
                let response = ServerResponse::from_value(&body, &self.limits);
                info!(
                    pattern = ?response.led_pattern,
                    steps = response.led_sequence.as_ref().map(Vec::len),
                    tones = response.sound_pattern.as_ref().map(Vec::len),
                    speech = response.speech.is_some(),
                    "server_response"
                );
                if response.has_actions() {
                    self.interpreter.act(&response, &mut self.fx).await;
                }
            }
            Err(e) => {
                error!(?path, %e, "upload_fail");
                self.fx.error_strobe().await;
            }
        }

        self.show_ready().await;
    }

    async fn show_ready(&mut self) {
        self.fx.ready().await;
        info!("ready");
    }

    /// Return to a safe idle baseline after a faulted tick
    async fn recover(&mut self, fault: &str) {
        error!(
            error = fault,
            state = %self.machine.state(),
            capturing = self.session.is_active(),
            animation = ?self.fx.leds.current(),
            "loop_error"
        );
        self.fx.error_strobe().await;
        self.session.abort().await;
        self.machine.reset();
        self.show_ready().await;
    }

    /// Stop capture and animation, switch the LEDs off, play the outro
    pub async fn shutdown(&mut self) {
        if self.machine.state().is_recording() {
            info!(state = %self.machine.state(), "recording interrupted");
        }
        self.session.abort().await;
        self.fx.leds.stop().await;
        self.fx.sfx.cue("outro", cues::OUTRO).await;
        info!("shutdown");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine as _;
    use serde_json::{json, Value};

    use crate::button::ScriptedButton;
    use crate::leds::{AnimationEngine, LedContext, MemoryStrip};
    use crate::net::FakeEndpoint;
    use crate::recording::FakeCapture;
    use crate::sound::{write_wav, RecordingPlayer, SoundEffects, ToneSynth};

    struct Rig {
        _dir: tempfile::TempDir,
        config: Config,
        strip: MemoryStrip,
        player: Arc<RecordingPlayer>,
        capture: FakeCapture,
        endpoint: Arc<FakeEndpoint>,
        app: Appliance,
    }

    fn rig(button: Box<dyn ButtonLine>, endpoint: FakeEndpoint, player: RecordingPlayer) -> Rig {
        rig_with(button, endpoint, player, &[])
    }

    fn rig_with(
        button: Box<dyn ButtonLine>,
        endpoint: FakeEndpoint,
        player: RecordingPlayer,
        env: &[(&str, &str)],
    ) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_path_buf();
        let env: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(move |key| match key {
            "HOME" => Some(home.display().to_string()),
            "SS_SFX" => Some("0".into()),
            _ => env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
        })
        .unwrap();
        config.ensure_dirs().unwrap();

        let strip = MemoryStrip::new();
        let leds = LedContext::shared(Box::new(strip.clone()), config.led_brightness);
        let player = Arc::new(player);
        let sfx = SoundEffects::new(
            ToneSynth::new(8_000, config.sfx_max_volume),
            player.clone(),
            dir.path().to_path_buf(),
            config.sfx_enabled,
        );
        let fx = Feedback::new(AnimationEngine::new(leds), sfx);
        let capture = FakeCapture::audio();
        let endpoint = Arc::new(endpoint);
        let app = Appliance::new(
            &config,
            button,
            fx,
            Arc::new(capture.clone()),
            endpoint.clone(),
        );

        Rig {
            _dir: dir,
            config,
            strip,
            player,
            capture,
            endpoint,
            app,
        }
    }

    async fn run_for(app: &mut Appliance, ms: u64) {
        tokio::select! {
            _ = app.run() => {}
            _ = sleep(Duration::from_millis(ms)) => {}
        }
    }

    fn recordings(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect()
    }

    fn showed(strip: &MemoryStrip, color: Rgb) -> bool {
        strip.snapshot().history.contains(&[color; 2])
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_records_uploads_and_returns_to_ready() {
        let button = ScriptedButton::new(&[(0, 2000)]);
        let mut r = rig(Box::new(button), FakeEndpoint::responding(json!({})), RecordingPlayer::default());

        run_for(&mut r.app, 4000).await;

        assert_eq!(r.capture.spawned(), 1);
        assert_eq!(r.capture.stopped(), 1);
        let files = recordings(&r.config.recordings_dir);
        assert_eq!(files.len(), 1);
        assert_eq!(r.endpoint.uploads(), files);
        assert!(showed(&r.strip, Rgb::AMBER));
        assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_tap_toggles_recording() {
        // taps shorter than the debounce interval, on the loop's sample grid
        let button = ScriptedButton::new(&[(0, 20), (150, 170), (300, 320), (450, 470)]);
        let mut r = rig(Box::new(button), FakeEndpoint::responding(json!({})), RecordingPlayer::default());

        run_for(&mut r.app, 400).await;
        assert_eq!(r.capture.spawned(), 1);
        assert_eq!(r.capture.stopped(), 0);
        assert_eq!(r.app.fx.leds.current(), Some("rainbow"));

        run_for(&mut r.app, 2000).await;
        assert_eq!(r.capture.stopped(), 1);
        assert_eq!(r.endpoint.uploads().len(), 1);
        assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_dims_and_press_wakes() {
        // a single tap shorter than the debounce interval
        let button = ScriptedButton::new(&[(3100, 3125)]);
        let mut r = rig_with(
            Box::new(button),
            FakeEndpoint::responding(json!({})),
            RecordingPlayer::default(),
            &[("SS_IDLE_DIM_SECS", "1")],
        );
        let ambient = r.config.led_brightness;
        assert!((r.strip.snapshot().brightness - ambient).abs() < 1e-6);

        run_for(&mut r.app, 3050).await;
        assert!((r.strip.snapshot().brightness - ambient * 0.125).abs() < 1e-6);

        run_for(&mut r.app, 150).await;
        assert!((r.strip.snapshot().brightness - ambient).abs() < 1e-6);
        assert_eq!(r.capture.spawned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_press_never_records() {
        let button = ScriptedButton::new(&[(0, 20)]);
        let mut r = rig(Box::new(button), FakeEndpoint::responding(json!({})), RecordingPlayer::default());

        run_for(&mut r.app, 1000).await;
        assert_eq!(r.capture.spawned(), 0);
        assert!(r.endpoint.uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_red_response_strobes_then_ready() {
        let button = ScriptedButton::new(&[(0, 500)]);
        let mut r = rig(
            Box::new(button),
            FakeEndpoint::responding(json!({"led": "red"})),
            RecordingPlayer::default(),
        );

        run_for(&mut r.app, 3000).await;
        assert_eq!(r.endpoint.uploads().len(), 1);
        let history = r.strip.snapshot().history;
        let strobe = history.iter().position(|p| *p == [Rgb::ERROR; 2]).unwrap();
        assert!(history[strobe..].contains(&[Rgb::READY; 2]));
        assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
    }

    fn wav_base64() -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav(&path, 8_000, &[500_i16; 800]).unwrap();
        base64::engine::general_purpose::STANDARD.encode(std::fs::read(&path).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_with_sequence() {
        let body = json!({
            "speak": wav_base64(),
            "led": "white",
            "led_sequence": [
                {"step": 0, "duration": 0.2, "led0": [0, 255, 0]},
                {"step": 1, "duration": 0.2, "led0": [0, 0, 255]}
            ]
        });
        let button = ScriptedButton::new(&[(0, 500)]);
        let mut r = rig(
            Box::new(button),
            FakeEndpoint::responding(body),
            RecordingPlayer::with_duration(Duration::from_secs(1)),
        );

        run_for(&mut r.app, 5000).await;

        let played = r.player.entries();
        assert_eq!(played.len(), 1);
        assert!(played[0].0.starts_with(&r.config.responses_dir));
        assert!(played[0].1.unwrap() > 44);

        let history = r.strip.snapshot().history;
        let blue = history.iter().filter(|p| **p == [Rgb(0, 0, 255); 2]).count();
        assert!(blue >= 2, "sequence looped during speech");
        assert!(!history.contains(&[Rgb::WHITE; 2]));
        assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_timeout_keeps_recording_and_loop() {
        let button = ScriptedButton::new(&[(0, 500), (100_000, 100_500)]);
        let mut r = rig(
            Box::new(button),
            FakeEndpoint::timing_out(Duration::from_secs(90)),
            RecordingPlayer::default(),
        );

        run_for(&mut r.app, 95_000).await;
        assert!(showed(&r.strip, Rgb::ERROR));
        assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
        let first = r.endpoint.uploads();
        assert_eq!(first.len(), 1);
        assert!(first[0].exists());

        // the loop keeps serving the button
        run_for(&mut r.app, 100_000).await;
        assert_eq!(r.capture.spawned(), 2);
        assert_eq!(r.endpoint.uploads().len(), 2);
        assert!(first[0].exists());
    }

    /// Faults on its first reads, then reports released
    struct FaultyButton {
        reads: Arc<AtomicUsize>,
        panic: bool,
    }

    impl ButtonLine for FaultyButton {
        fn is_pressed(&mut self) -> io::Result<bool> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                if self.panic {
                    panic!("gpio driver bug");
                }
                return Err(io::Error::new(io::ErrorKind::Other, "gpio read failed"));
            }
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_faulted_tick_recovers() {
        for panic in [false, true] {
            let reads = Arc::new(AtomicUsize::new(0));
            let button = FaultyButton {
                reads: Arc::clone(&reads),
                panic,
            };
            let mut r = rig(Box::new(button), FakeEndpoint::responding(Value::Null), RecordingPlayer::default());

            run_for(&mut r.app, 2000).await;
            assert!(showed(&r.strip, Rgb::ERROR));
            assert_eq!(r.strip.snapshot().pixels, [Rgb::READY; 2]);
            assert!(reads.load(Ordering::SeqCst) > 10);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_turns_leds_off() {
        let button = ScriptedButton::new(&[(0, 5000)]);
        let mut r = rig(Box::new(button), FakeEndpoint::responding(json!({})), RecordingPlayer::default());

        run_for(&mut r.app, 1000).await;
        assert_eq!(r.capture.spawned(), 1);

        r.app.shutdown().await;
        assert_eq!(r.capture.stopped(), 1);
        assert_eq!(r.strip.snapshot().pixels, [Rgb::OFF; 2]);
        assert!(r.endpoint.uploads().is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panic: boom");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic");
    }
}
