//! Remote action endpoint: recording upload and audio fetch

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};

/// The remote service a recording is sent to
#[async_trait]
pub trait ActionEndpoint: Send + Sync {
    /// Upload a recording and return the decoded JSON response body
    async fn upload(&self, recording: &Path) -> Result<Value>;

    /// Download a remote audio file to `dest`
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP implementation backed by `reqwest`
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    device_id: String,
}

/// Timeout for audio downloads
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Largest speech file accepted from a remote URL
pub const MAX_FETCH_BYTES: u64 = 16 * 1024 * 1024;

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, device_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            device_id: device_id.into(),
        })
    }
}

#[async_trait]
impl ActionEndpoint for HttpEndpoint {
    async fn upload(&self, recording: &Path) -> Result<Value> {
        let file_name = recording
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording.wav".into());
        let bytes = tokio::fs::read(recording).await?;
        let size = bytes.len();

        let audio = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("audio", audio)
            .text("filename", file_name)
            .text("device", self.device_id.clone());

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        debug!(status = %resp.status(), bytes = size, "upload accepted");

        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Network(format!("response is not JSON: {e}")))
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        if let Some(len) = resp.content_length().filter(|len| *len > MAX_FETCH_BYTES) {
            return Err(too_large(len));
        }

        let chunks = futures::stream::unfold(resp, |mut resp| async move {
            match resp.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), resp)),
                Ok(None) => None,
                Err(e) => Some((Err(Error::from(e)), resp)),
            }
        });
        let mut file = tokio::fs::File::create(dest).await?;
        let written = copy_capped(chunks, &mut file, MAX_FETCH_BYTES).await?;
        debug!(url, bytes = written, "audio fetched");
        Ok(())
    }
}

/// Write every chunk to `out`, failing once more than `cap` bytes arrive
async fn copy_capped<S, B, W>(chunks: S, out: &mut W, cap: u64) -> Result<u64>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    futures::pin_mut!(chunks);
    let mut total = 0_u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        total += chunk.len() as u64;
        if total > cap {
            return Err(too_large(total));
        }
        out.write_all(chunk).await?;
    }
    out.flush().await?;
    Ok(total)
}

fn too_large(bytes: u64) -> Error {
    Error::PayloadDecode(format!(
        "remote audio exceeds {MAX_FETCH_BYTES} bytes ({bytes} received)"
    ))
}

#[cfg(test)]
pub use fake::FakeEndpoint;

#[cfg(test)]
mod fake {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;

    /// Scripted endpoint for tests
    pub struct FakeEndpoint {
        response: std::result::Result<Value, String>,
        /// Bytes written by `fetch`
        audio: Vec<u8>,
        delay: Duration,
        uploads: Mutex<Vec<PathBuf>>,
        fetches: Mutex<Vec<String>>,
    }

    impl FakeEndpoint {
        pub fn responding(body: Value) -> Self {
            Self {
                response: Ok(body),
                audio: b"RIFF fake audio".to_vec(),
                delay: Duration::ZERO,
                uploads: Mutex::new(Vec::new()),
                fetches: Mutex::new(Vec::new()),
            }
        }

        /// Upload waits `delay`, then fails like a request timeout
        pub fn timing_out(delay: Duration) -> Self {
            Self {
                response: Err("operation timed out".into()),
                delay,
                ..Self::responding(Value::Null)
            }
        }

        pub fn uploads(&self) -> Vec<PathBuf> {
            self.uploads.lock().unwrap().clone()
        }

        pub fn fetches(&self) -> Vec<String> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionEndpoint for FakeEndpoint {
        async fn upload(&self, recording: &Path) -> Result<Value> {
            self.uploads.lock().unwrap().push(recording.to_path_buf());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone().map_err(Error::Network)
        }

        async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.fetches.lock().unwrap().push(url.to_string());
            tokio::fs::write(dest, &self.audio).await?;
            Ok(())
        }
    }
}
