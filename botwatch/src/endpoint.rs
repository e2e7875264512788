//! Turns operator-entered host/URL strings into canonical HTTP and WebSocket endpoints.
//! Malformed input never errors; it degrades to an empty string.

use url::Url;

/// Suffix appended when the stream endpoint is derived from the HTTP endpoint.
pub const STREAM_SUFFIX: &str = "/ws";

/// Canonical `scheme://host[:port][/path]` with the trailing slash stripped,
/// or `""` if `raw` is empty or cannot be parsed as an HTTP(S) URL.
pub fn normalize_http(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let Ok(url) = Url::parse(&candidate) else {
        return String::new();
    };
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        _ => return String::new(),
    };
    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h,
        _ => return String::new(),
    };

    let mut out = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(url.path().trim_end_matches('/'));
    out
}

/// Stream endpoint for a canonical HTTP endpoint.
///
/// An explicit value wins: `ws`/`wss` verbatim, `http`/`https` converted,
/// anything else prefixed with `ws://`. Otherwise the HTTP scheme is swapped
/// and [`STREAM_SUFFIX`] appended.
pub fn derive_stream(http_endpoint: &str, explicit: Option<&str>) -> String {
    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        let lower = explicit.to_ascii_lowercase();
        if lower.starts_with("ws://") || lower.starts_with("wss://") {
            return explicit.to_string();
        }
        if let Some(rest) = strip_prefix_ci(explicit, "https://") {
            return format!("wss://{rest}");
        }
        if let Some(rest) = strip_prefix_ci(explicit, "http://") {
            return format!("ws://{rest}");
        }
        return format!("ws://{explicit}");
    }

    if http_endpoint.is_empty() {
        return String::new();
    }
    let converted = if let Some(rest) = http_endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return String::new();
    };
    format!("{}{STREAM_SUFFIX}", converted.trim_end_matches('/'))
}

/// Joins a canonical base and a candidate path (`"/health"`, `"/"`).
pub fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
