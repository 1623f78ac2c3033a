//! Incremental response-header capture.
//!
//! Transports report header lines one at a time as they come off the wire.
//! [`parse_header_line`] turns a raw line into a `(name, value)` pair and
//! [`HeaderSink`] accumulates them for one transfer until it completes.

use std::sync::{Arc, Mutex, PoisonError};

use crate::types::Headers;

/// Parse one raw header line into `(name, value)`.
///
/// The line is trimmed, then split on the first colon. Lines without a colon
/// (status lines, the blank terminator) and lines whose colon is the first
/// character are ignored. Leading non-word characters are stripped from the
/// value, which also removes the separator and any padding after it.
pub fn parse_header_line(line: &[u8]) -> Option<(String, String)> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let colon = line.find(':')?;
    if colon == 0 {
        return None;
    }
    let name = &line[..colon];
    let value = line[colon..].trim_start_matches(|c: char| !is_word_char(c));
    Some((name.to_string(), value.to_string()))
}

// ASCII only: a value starting with `é` loses it, the same as `"`.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Header accumulator shared between a transport callback and the executor.
///
/// Cloning is cheap; every clone writes into the same map. The lock is only
/// ever contended by the one transfer that owns the sink and the drain step
/// that collects it, so `push_line` never waits on executor state.
#[derive(Debug, Clone, Default)]
pub struct HeaderSink {
    inner: Arc<Mutex<Headers>>,
}

impl HeaderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw header line. Unparseable lines are dropped.
    pub fn push_line(&self, line: &[u8]) {
        if let Some((name, value)) = parse_header_line(line) {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name, value);
        }
    }

    /// Take everything captured so far, leaving the sink empty.
    pub fn take(&self) -> Headers {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_colon() {
        let (name, value) = parse_header_line(b"Location: http://host:8080/x\r\n").unwrap();
        assert_eq!(name, "Location");
        assert_eq!(value, "http://host:8080/x");
    }

    #[test]
    fn ignores_status_line_and_terminator() {
        assert!(parse_header_line(b"HTTP/1.1 200 OK\r\n").is_none());
        assert!(parse_header_line(b"\r\n").is_none());
    }

    #[test]
    fn strips_leading_punctuation_from_value() {
        let (_, value) = parse_header_line(b"ETag: \"abc\"").unwrap();
        assert_eq!(value, "abc\"");
    }

    #[test]
    fn non_ascii_letters_are_not_word_chars() {
        let (_, value) = parse_header_line("X-Name: \u{e9}clair".as_bytes()).unwrap();
        assert_eq!(value, "clair");
        let (_, value) = parse_header_line("X-Name: caf\u{e9}".as_bytes()).unwrap();
        assert_eq!(value, "caf\u{e9}");
    }

    #[test]
    fn empty_value_is_kept() {
        let (name, value) = parse_header_line(b"X-Empty:").unwrap();
        assert_eq!(name, "X-Empty");
        assert_eq!(value, "");
    }

    #[test]
    fn sink_overwrites_duplicates_and_drains() {
        let sink = HeaderSink::new();
        let writer = sink.clone();
        writer.push_line(b"X-Seen: 1\r\n");
        writer.push_line(b"x-seen: 2\r\n");
        writer.push_line(b"garbage\r\n");

        let headers = sink.take();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Seen"), Some("2"));
        assert!(sink.take().is_empty());
    }
}
