//! Helpers for sanitizing data before it enters log fields and spans.
//!
//! Transcripts can be long and personal, service URLs can carry
//! credentials, and error bodies can echo tokens back. Nothing from those
//! goes into a span unfiltered.

/// Maximum length for error bodies kept in messages and logs.
pub const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Strips userinfo and the query string from a URL.
///
/// - `https://user:pw@api.example.com/v1` → `https://****@api.example.com/v1`
/// - `https://api.example.com/v1?key=abc` → `https://api.example.com/v1?****`
pub fn redact_url(url: &str) -> String {
    let (base, had_query) = match url.split_once('?') {
        Some((base, _)) => (base, true),
        None => (url, false),
    };

    let mut out = match base.find("://") {
        Some(scheme_end) => {
            let after_scheme = &base[scheme_end + 3..];
            let host_end = after_scheme.find('/').unwrap_or(after_scheme.len());
            match after_scheme[..host_end].rfind('@') {
                Some(at_pos) => format!(
                    "{}****@{}",
                    &base[..scheme_end + 3],
                    &after_scheme[at_pos + 1..]
                ),
                None => base.to_string(),
            }
        }
        None => base.to_string(),
    };

    if had_query {
        out.push_str("?****");
    }
    out
}

/// Returns at most `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Truncates a response body to [`MAX_ERROR_BODY_LENGTH`] characters.
pub fn truncate_error_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}
