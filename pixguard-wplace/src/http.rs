use pixguard_core::PixguardError;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use url::Url;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Headers the backend expects from a browser session.
pub(crate) fn browser_headers(accept: &'static str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    h.insert(ACCEPT, HeaderValue::from_static(accept));
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    for (name, value) in [
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-site"),
        (
            "sec-ch-ua",
            "\"Chromium\";v=\"120\", \"Not=A?Brand\";v=\"24\", \"Google Chrome\";v=\"120\"",
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"Windows\""),
    ] {
        h.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    h
}

/// Parse a base URL and derive its rate-limit host key.
pub(crate) fn parse_base(base: &str) -> Result<(Url, String), PixguardError> {
    let url = Url::parse(base)
        .map_err(|e| PixguardError::InvalidArg(format!("base url {base:?}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| PixguardError::InvalidArg(format!("base url {base:?} has no host")))?
        .to_owned();
    Ok((url, host))
}

/// Resolve an absolute path against the base URL.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, PixguardError> {
    base.join(path)
        .map_err(|e| PixguardError::InvalidArg(format!("endpoint {path:?}: {e}")))
}

pub(crate) fn transport_error(host: &str, err: &reqwest::Error) -> PixguardError {
    if err.is_timeout() {
        return PixguardError::timeout(format!("request to {host}"));
    }
    PixguardError::http(host, err.status().map(|s| s.as_u16()), err.to_string())
}

/// Map a non-success status to the workspace error.
pub(crate) fn status_error(host: &str, status: StatusCode, body: &str) -> PixguardError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return PixguardError::rate_limited(host);
    }
    let mut msg = status.canonical_reason().unwrap_or("unexpected status").to_owned();
    if !body.is_empty() {
        msg.push_str(": ");
        msg.extend(body.chars().take(200));
    }
    PixguardError::http(host, Some(status.as_u16()), msg)
}

pub(crate) fn client_error(err: &reqwest::Error) -> PixguardError {
    PixguardError::Other(format!("http client: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_host_is_the_rate_limit_key() {
        let (url, host) = parse_base("https://backend.wplace.live").unwrap();
        assert_eq!(host, "backend.wplace.live");
        let tile = endpoint(&url, "/files/s0/tiles/1/2.png").unwrap();
        assert_eq!(tile.as_str(), "https://backend.wplace.live/files/s0/tiles/1/2.png");
    }

    #[test]
    fn base_without_host_is_rejected() {
        assert!(matches!(
            parse_base("data:text/plain,hi"),
            Err(PixguardError::InvalidArg(_))
        ));
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = status_error("h", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err, PixguardError::rate_limited("h"));
        let err = status_error("h", StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, PixguardError::Http { status: Some(502), .. }));
    }
}
