use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pixguard_core::{PixguardError, TileBytes, TileCoord, TileSource};
use url::Url;

use crate::DEFAULT_BASE_URL;
use crate::http::{
    browser_headers, client_error, endpoint, parse_base, status_error, transport_error,
};

const TILE_TIMEOUT: Duration = Duration::from_secs(12);

/// Tile PNG downloader.
///
/// Every request carries a `t=` cache-busting query so intermediate caches never
/// serve stale paint.
#[derive(Debug, Clone)]
pub struct WplaceTiles {
    client: reqwest::Client,
    base: Url,
    host: String,
}

impl WplaceTiles {
    /// Connector for the production backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, PixguardError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Connector for a custom backend (mirrors, test servers).
    ///
    /// # Errors
    /// Returns `InvalidArg` for an unparsable base URL, or an error if the HTTP
    /// client cannot be constructed.
    pub fn with_base_url(base: &str) -> Result<Self, PixguardError> {
        let client = reqwest::Client::builder()
            .timeout(TILE_TIMEOUT)
            .default_headers(browser_headers("image/png,image/*;q=0.8,*/*;q=0.5"))
            .build()
            .map_err(|e| client_error(&e))?;
        Self::with_client(client, base)
    }

    /// Connector reusing a caller-configured client.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an unparsable base URL.
    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self, PixguardError> {
        let (base, host) = parse_base(base)?;
        Ok(Self { client, base, host })
    }

    fn tile_url(&self, tile: TileCoord) -> Result<Url, PixguardError> {
        let mut url = endpoint(&self.base, &format!("/files/s0/tiles/{}/{}.png", tile.x, tile.y))?;
        let bust = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .rem_euclid(10_000_000);
        url.query_pairs_mut().append_pair("t", &bust.to_string());
        Ok(url)
    }
}

#[async_trait]
impl TileSource for WplaceTiles {
    fn name(&self) -> &'static str {
        "pixguard-wplace"
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        let url = self.tile_url(tile)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(tile = %tile, url = %url, "downloading tile");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&self.host, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            #[cfg(feature = "tracing")]
            tracing::warn!(tile = %tile, status = status.as_u16(), "tile download failed");
            return Err(status_error(&self.host, status, &body));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport_error(&self.host, &e))?;
        Ok(Arc::from(bytes.as_ref()))
    }
}
