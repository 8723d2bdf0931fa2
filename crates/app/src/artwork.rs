use anyhow::{Context, Result};
use async_trait::async_trait;
use nowbar_sync::ArtworkFetcher;
use std::time::Duration;
use url::Url;

/// Best-effort artwork download. Every failure is reduced to "no artwork"
/// by the synchronizer; nothing here is ever user-visible.
pub struct HttpArtworkFetcher {
    client: reqwest::Client,
}

impl HttpArtworkFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build artwork http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("artwork request failed")?
            .error_for_status()
            .context("artwork request rejected")?;
        let bytes = response
            .bytes()
            .await
            .context("failed reading artwork body")?;
        Ok(bytes.to_vec())
    }
}
