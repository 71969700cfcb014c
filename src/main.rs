//! safetyscribe: push-to-talk voice capture appliance
//!
//! Watches a GPIO button, records with `arecord` while it is held (or
//! between two double-taps), uploads the clip to the action endpoint and
//! renders the JSON reply on a two-pixel DotStar strip and the speaker.
//!
//! Runtime faults never stop the process. Only a missing device or a
//! malformed setting at startup does.

mod app;
mod audio;
mod button;
mod config;
mod error;
mod events;
mod feedback;
mod leds;
mod lifecycle;
mod net;
mod recording;
mod response;
mod sound;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::app::Appliance;
use crate::audio::mixer;
use crate::button::SysfsButton;
use crate::config::Config;
use crate::error::Error;
use crate::feedback::Feedback;
use crate::leds::{AnimationEngine, DotStar, LedContext};
use crate::lifecycle::ShutdownSignal;
use crate::net::HttpEndpoint;
use crate::recording::Arecord;
use crate::sound::{cues, Aplay, SoundEffects, ToneSynth};

/// Push-to-talk voice capture appliance
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Disable synthetic sound effects
    #[arg(long)]
    no_sfx: bool,

    /// Start without waiting for the endpoint host to become reachable
    #[arg(long)]
    skip_network_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load()?;
    if args.no_sfx {
        config.sfx_enabled = false;
    }
    config.ensure_dirs()?;

    lifecycle::logging::init(&config.log_path, config.debug)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.audio_device,
        rate = config.sample_rate,
        channels = config.channels,
        endpoint = %config.endpoint,
        recs = ?config.recordings_dir,
        "startup"
    );

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Device faults here are the only ones allowed to stop the process
    let button = SysfsButton::open(&config.gpio_root, config.gpio_line, config.button_active_low)
        .map_err(|e| Error::Configuration(format!("button line {}: {e}", config.gpio_line)))?;
    let strip = DotStar::open(&config.led_spi, config.led_brightness)
        .map_err(|e| Error::Configuration(format!("led strip {:?}: {e}", config.led_spi)))?;
    let endpoint = HttpEndpoint::new(
        config.endpoint.clone(),
        config.device_id.clone(),
        config.request_timeout,
    )?;

    if config.mixer_init {
        mixer::configure(mixer::WM8960_COMMANDS).await;
    }

    let sfx = SoundEffects::new(
        ToneSynth::new(config.sample_rate, config.sfx_max_volume),
        Arc::new(Aplay::new(config.audio_device.clone())),
        config.scratch_dir.clone(),
        config.sfx_enabled,
    );
    let leds = LedContext::shared(Box::new(strip), config.led_brightness);
    let mut fx = Feedback::new(AnimationEngine::new(leds), sfx);

    fx.sfx.cue("startup", cues::STARTUP).await;

    if !args.skip_network_wait {
        let interrupted = tokio::select! {
            _ = net::wait_for_network(&config.net_host, config.net_port, &mut fx) => false,
            _ = shutdown.wait() => true,
        };
        if interrupted {
            info!("shutdown signal received");
            fx.leds.stop().await;
            info!("shutdown");
            return Ok(());
        }
    }

    fx.ready().await;
    info!("ready");

    let capture = Arecord::new(config.audio_device.clone(), config.sample_rate, config.channels);
    let mut appliance = Appliance::new(
        &config,
        Box::new(button),
        fx,
        Arc::new(capture),
        Arc::new(endpoint),
    );

    tokio::select! {
        _ = appliance.run() => {}
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    appliance.shutdown().await;
    Ok(())
}
