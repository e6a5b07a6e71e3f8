//! URL validation and local filename derivation.
//!
//! The URL path basename is canonical. A `Content-Disposition` header with a
//! plain `filename=` parameter (quoted or token) overrides it; the RFC 5987
//! `filename*` form is not honored. Results are sanitized for the local
//! filesystem.

use crate::error::Error;

/// Fallback when neither the URL path nor the header yields a usable name.
const DEFAULT_FILENAME: &str = "download.bin";

/// Accepted URL schemes.
const SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Parses the URL and checks the scheme is http, https, or ftp.
pub fn validate_url(raw: &str) -> Result<url::Url, Error> {
    let parsed =
        url::Url::parse(raw).map_err(|e| Error::Validation(format!("invalid URL {}: {}", raw, e)))?;
    if !SCHEMES.contains(&parsed.scheme()) {
        return Err(Error::Validation(format!(
            "unsupported URL scheme {:?} (expected http, https, or ftp)",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

/// Derives the local filename for a download.
pub fn derive_filename(url: &url::Url, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(disposition_filename)
        .or_else(|| basename_from_url(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };
    let clean = sanitize(&raw);
    if clean.is_empty() || clean == "." || clean == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        clean
    }
}

/// Last non-empty path segment, ignoring query and fragment.
fn basename_from_url(url: &url::Url) -> Option<String> {
    let segment = url.path().split('/').filter(|s| !s.is_empty()).next_back()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Extracts a `filename=` parameter from a Content-Disposition value.
/// Quoted values are unquoted; backslash escapes inside quotes are dropped.
fn disposition_filename(value: &str) -> Option<String> {
    for param in value.split(';') {
        let param = param.trim();
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("filename") {
            continue;
        }
        let v = v.trim();
        let unquoted = if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
            v[1..v.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
        } else {
            v.to_string()
        };
        if !unquoted.is_empty() {
            return Some(unquoted);
        }
    }
    None
}

/// Replaces separators and control characters, trims dot/space edges, and
/// bounds the name at 255 bytes (NAME_MAX).
fn sanitize(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
