//! Minimal HTTP/1.1 server with HEAD and Range GET support for engine tests.
//!
//! Serves one static body. Options control whether HEAD is allowed, whether
//! ranges are honored/advertised, whether Content-Length is sent, and an
//! optional per-piece write delay so tests can pause or cancel a transfer
//! while it is in flight.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET ignores Range and returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, `Accept-Ranges: bytes` is omitted even when ranges work.
    pub advertise_ranges: bool,
    /// If false, `Content-Length` is omitted and the body is delimited by
    /// connection close (forces the unknown-size path).
    pub send_content_length: bool,
    /// Write the body in pieces of this size, sleeping `piece_delay`
    /// between pieces. `None` writes the body in one go.
    pub piece_size: Option<usize>,
    pub piece_delay: Duration,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            send_content_length: true,
            piece_size: None,
            piece_delay: Duration::from_millis(0),
        }
    }
}

/// Counters shared with the test: how many GETs carried a Range header.
#[derive(Default)]
pub struct ServerStats {
    pub range_requests: AtomicUsize,
}

/// Start a server for `body` with default options. Returns the base URL.
#[allow(dead_code)]
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default()).0
}

/// Start a server with custom behavior. Returns the base URL (ending in
/// `/`) and the request stats handle. Runs until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> (String, Arc<ServerStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let stats = Arc::new(ServerStats::default());
    let stats_out = Arc::clone(&stats);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let stats = Arc::clone(&stats);
            thread::spawn(move || handle(stream, &body, opts, &stats));
        }
    });
    (format!("http://127.0.0.1:{}/", port), stats_out)
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, stats: &ServerStats) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;

    let accept_ranges = if opts.advertise_ranges && opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
            return;
        }
        let content_length = if opts.send_content_length {
            format!("Content-Length: {}\r\n", total)
        } else {
            String::new()
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\n{}{}Connection: close\r\n\r\n",
            content_length, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        if range.is_some() {
            stats.range_requests.fetch_add(1, Ordering::Relaxed);
        }

        let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
            Some((start, end_incl)) => {
                let start = start.min(total);
                let end_incl = end_incl.min(total.saturating_sub(1));
                if start > end_incl {
                    let _ = stream.write_all(
                        b"HTTP/1.1 416 Range Not Satisfiable\r\nConnection: close\r\n\r\n",
                    );
                    return;
                }
                let slice = &body[start as usize..=end_incl as usize];
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                    slice,
                )
            }
            None => ("200 OK", String::new(), body),
        };

        let content_length = if opts.send_content_length {
            format!("Content-Length: {}\r\n", slice.len())
        } else {
            String::new()
        };
        let response = format!(
            "HTTP/1.1 {}\r\n{}{}{}Connection: close\r\n\r\n",
            status, content_length, content_range, accept_ranges
        );
        if stream.write_all(response.as_bytes()).is_err() {
            return;
        }
        match opts.piece_size {
            Some(piece) if piece > 0 => {
                for part in slice.chunks(piece) {
                    if stream.write_all(part).is_err() {
                        return;
                    }
                    let _ = stream.flush();
                    thread::sleep(opts.piece_delay);
                }
            }
            _ => {
                let _ = stream.write_all(slice);
            }
        }
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
}

/// Returns (method, optional (start, end_inclusive) from `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
