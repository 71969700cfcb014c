//! Network liveness gate
//!
//! Blocks startup until the remote host accepts a TCP connection, showing
//! an orange pulse meanwhile.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::feedback::Feedback;
use crate::leds::{Effect, Rgb};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(2500);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One connection attempt
pub async fn probe(host: &str, port: u16, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host, port, %e, "wifi_wait_connect_fail");
            false
        }
        Err(_) => {
            debug!(host, port, "wifi_wait_connect_timeout");
            false
        }
    }
}

/// Retry until `host:port` is reachable, then show ready
pub async fn wait_for_network(host: &str, port: u16, fx: &mut Feedback) {
    fx.leds.start(Effect::Breathe(Rgb::AMBER)).await;
    while !probe(host, port, CONNECT_TIMEOUT).await {
        sleep(RETRY_DELAY).await;
    }
    fx.ready().await;
    info!(host, port, "network_ready");
}
