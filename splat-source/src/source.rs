use std::path::Path;
use std::time::Duration;
use log::info;
use serde::{Deserialize, Serialize};
use crate::SplatSourceError;
use crate::error::Result;

/// Where a static trained model lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Source {
    File { path: String },
    Url { url: String },
}

impl Source {
    /// Read the whole payload into memory.
    pub async fn read(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self {
            Source::File { path } => Ok(tokio::fs::read(path).await?),
            Source::Url { url } => {
                let client = reqwest::Client::builder().timeout(timeout).build()?;
                fetch(&client, url, timeout).await
            }
        }
    }
}

/// Base location of a frame sequence. Frame `i` resolves as `frame_{i}.npz`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FrameSource {
    Dir { path: String },
    Url { base_url: String },
}

/// Fetches per-frame archives from a [`FrameSource`].
///
/// The request timeout is fixed at construction; cancelling a fetch is
/// dropping its future.
pub struct FrameFetcher {
    source: FrameSource,
    client: reqwest::Client,
    timeout: Duration,
}

impl FrameFetcher {
    pub fn new(source: FrameSource, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            source,
            client,
            timeout,
        })
    }

    pub async fn fetch_frame(&self, index: u32) -> Result<Vec<u8>> {
        let name = format!("frame_{index}.npz");
        match &self.source {
            FrameSource::Dir { path } => Ok(tokio::fs::read(Path::new(path).join(name)).await?),
            FrameSource::Url { base_url } => {
                let url = format!("{}/{name}", base_url.trim_end_matches('/'));
                fetch(&self.client, &url, self.timeout).await
            }
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| wrap_timeout(err, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SplatSourceError::Status(status.as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| wrap_timeout(err, timeout))?;
    info!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}

fn wrap_timeout(err: reqwest::Error, timeout: Duration) -> SplatSourceError {
    if err.is_timeout() {
        SplatSourceError::Timeout(timeout)
    } else {
        SplatSourceError::Http(err)
    }
}
