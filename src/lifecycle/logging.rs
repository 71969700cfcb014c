//! Tracing setup: human output on stdout plus a JSON event log file

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the stdout filter. The file layer appends one
/// JSON record per event; if the file cannot be opened only stdout is
/// used.
pub fn init(log_path: &Path, debug: bool) -> anyhow::Result<()> {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let stdout_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let stdout = tracing_subscriber::fmt::layer().with_filter(stdout_filter);

    let file = if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(log_path))
    } else {
        OpenOptions::new().create(true).append(true).open(log_path)
    };

    let (json, open_error) = match file {
        Ok(file) => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(Mutex::new(file))
                .with_current_span(false)
                .with_span_list(false)
                .with_filter(level);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(stdout)
        .with(json)
        .try_init()?;

    if let Some(e) = open_error {
        warn!(path = ?log_path, %e, "event log unavailable, logging to stdout only");
    }
    Ok(())
}
