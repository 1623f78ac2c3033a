//! Outbound request description handed to an executor.
//!
//! # Design
//! Requests are plain data. Everything the caller wants configured (headers,
//! body, per-request timeout) is set here before submission; the executors
//! never mutate a request after it is handed over. Owned `String` / `Vec`
//! fields keep the value `Send` so it can move onto the transport runtime.

use std::fmt;
use std::time::Duration;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// Built with [`HttpRequest::get`] / [`HttpRequest::new`] and the chained
/// setters, then passed to [`crate::Executor::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Whole-transfer deadline. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(HttpMethod::Post, url).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_has_no_body() {
        let req = HttpRequest::get("http://localhost/ok");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost/ok");
        assert!(req.body.is_none());
        assert!(req.timeout.is_none());
    }

    #[test]
    fn post_carries_body_and_headers_in_order() {
        let req = HttpRequest::post("http://localhost/echo", "payload")
            .header("Content-Type", "text/plain")
            .header("X-Trace", "1");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(
            req.headers,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn method_renders_uppercase() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }
}
