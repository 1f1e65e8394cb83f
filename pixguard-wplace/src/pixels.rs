use std::time::Duration;

use async_trait::async_trait;
use pixguard_core::{LinkedIdentity, PainterInfo, PainterLookup, PixelCoordinate, PixguardError};
use serde::Deserialize;
use url::Url;

use crate::DEFAULT_BASE_URL;
use crate::http::{
    browser_headers, client_error, endpoint, parse_base, status_error, transport_error,
};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct PixelResponse {
    #[serde(rename = "paintedBy")]
    painted_by: Option<RawPainter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPainter {
    id: u64,
    name: String,
    #[serde(rename = "allianceName")]
    alliance_name: String,
    discord: String,
    #[serde(rename = "discordId")]
    discord_id: String,
}

impl RawPainter {
    fn into_info(self) -> Option<PainterInfo> {
        if self.id == 0 {
            return None;
        }
        let linked = (!self.discord_id.is_empty()).then(|| LinkedIdentity {
            account_id: self.discord_id,
            handle: self.discord,
        });
        Some(PainterInfo {
            id: self.id,
            name: self.name,
            alliance_name: self.alliance_name,
            linked,
        })
    }
}

/// Decode a pixel-info payload. A missing `paintedBy` or id 0 means nobody.
pub(crate) fn parse_pixel_response(body: &[u8]) -> Result<Option<PainterInfo>, PixguardError> {
    let parsed: PixelResponse = serde_json::from_slice(body)
        .map_err(|e| PixguardError::Data(format!("pixel response: {e}")))?;
    Ok(parsed.painted_by.and_then(RawPainter::into_info))
}

/// Painter lookup against the pixel-info endpoint.
#[derive(Debug, Clone)]
pub struct WplacePixels {
    client: reqwest::Client,
    base: Url,
    host: String,
}

impl WplacePixels {
    /// Connector for the production backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, PixguardError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Connector for a custom backend.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an unparsable base URL, or an error if the HTTP
    /// client cannot be constructed.
    pub fn with_base_url(base: &str) -> Result<Self, PixguardError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(0)
            .default_headers(browser_headers("application/json, text/plain, */*"))
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

    fn pixel_url(&self, pixel: PixelCoordinate) -> Result<Url, PixguardError> {
        let tile = pixel.tile();
        let (px, py) = pixel.in_tile();
        let mut url = endpoint(&self.base, &format!("/s0/pixel/{}/{}", tile.x, tile.y))?;
        url.query_pairs_mut()
            .append_pair("x", &px.to_string())
            .append_pair("y", &py.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PainterLookup for WplacePixels {
    fn name(&self) -> &'static str {
        "pixguard-wplace"
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn lookup(&self, pixel: PixelCoordinate) -> Result<Option<PainterInfo>, PixguardError> {
        let url = self.pixel_url(pixel)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&self.host, &e))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| transport_error(&self.host, &e))?;
        if !status.is_success() {
            #[cfg(feature = "tracing")]
            tracing::debug!(pixel = %pixel, status = status.as_u16(), "pixel lookup failed");
            return Err(status_error(
                &self.host,
                status,
                &String::from_utf8_lossy(&body),
            ));
        }
        parse_pixel_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn painter_with_discord_is_linked() {
        let body = br#"{"paintedBy":{"id":42,"name":"alice","allianceName":"koukyo","discord":"alice#1","discordId":"99"}}"#;
        let got = parse_pixel_response(body).unwrap().unwrap();
        assert_eq!(got.id, 42);
        assert_eq!(got.alliance_name, "koukyo");
        assert_eq!(
            got.linked,
            Some(LinkedIdentity {
                account_id: "99".into(),
                handle: "alice#1".into()
            })
        );
    }

    #[test]
    fn missing_or_zero_painter_is_none() {
        assert_eq!(parse_pixel_response(b"{}").unwrap(), None);
        assert_eq!(parse_pixel_response(br#"{"paintedBy":null}"#).unwrap(), None);
        assert_eq!(
            parse_pixel_response(br#"{"paintedBy":{"id":0,"name":""}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_payload_is_a_data_error() {
        assert!(matches!(
            parse_pixel_response(b"<html>"),
            Err(PixguardError::Data(_))
        ));
    }

    #[test]
    fn pixel_url_splits_tile_and_offset() {
        let c = WplacePixels::with_client(reqwest::Client::new(), "https://backend.wplace.live")
            .unwrap();
        let url = c.pixel_url(PixelCoordinate::new(1_818_989, 806_358)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://backend.wplace.live/s0/pixel/1818/806?x=989&y=358"
        );
    }
}
