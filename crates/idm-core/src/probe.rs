//! Origin probing via HEAD: size, range support, filename hint.

use crate::error::Error;
use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::Client;
use std::time::Duration;

/// What a HEAD round trip told us about the origin.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    /// Value of `Content-Length`, when present and parseable.
    pub content_length: Option<u64>,
    /// True only for `Accept-Ranges: bytes`; absence or any other value
    /// forces single-stream mode.
    pub accept_ranges: bool,
    /// Raw `Content-Disposition` value for filename derivation.
    pub content_disposition: Option<String>,
}

/// Issue a HEAD request bounded by `timeout`. Transport failures are
/// `Error::Network`; non-2xx responses still yield whatever headers came
/// back (a 405 from a HEAD-blocking origin just means "probe learned
/// nothing").
pub async fn probe_origin(client: &Client, url: &str, timeout: Duration) -> Result<ProbeResult, Error> {
    let resp = client
        .head(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::Network(format!("HEAD {}: {}", url, e)))?;

    let headers = resp.headers();
    Ok(ProbeResult {
        content_length: parse_content_length(
            headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok()),
        ),
        accept_ranges: ranges_supported(headers.get(ACCEPT_RANGES).and_then(|v| v.to_str().ok())),
        content_disposition: headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    })
}

/// Range support is inferred solely from `Accept-Ranges: bytes`.
pub fn ranges_supported(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"))
}

pub fn parse_content_length(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}
