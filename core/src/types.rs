//! Result data produced by the executors.
//!
//! # Design
//! A `ResponseRecord` only exists once its transfer is complete, so holding
//! one means `data` is final. Transport failures still produce a record: the
//! status is 0, the body is empty and `error` says what went wrong.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Response headers in arrival order.
///
/// Names compare case-insensitively. Inserting a name that is already present
/// replaces its value in place, keeping the position of the first arrival.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl Index<&str> for Headers {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no header named {name:?}"),
        }
    }
}

/// Metadata the transport reports for a finished transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferInfo {
    /// Final status code; 0 when no response was received.
    pub code: u16,
    /// Wall-clock seconds from submission to completion.
    pub total_time: f64,
    /// Declared `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// URL after following redirects.
    pub effective_url: String,
}

/// The complete outcome of one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub data: Vec<u8>,
    pub headers: Headers,
    pub code: u16,
    pub time: f64,
    pub length: Option<u64>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

impl ResponseRecord {
    pub(crate) fn from_parts(
        data: Vec<u8>,
        headers: Headers,
        info: TransferInfo,
        error: Option<TransferError>,
    ) -> Self {
        Self {
            data,
            headers,
            code: info.code,
            time: info.total_time,
            length: info.content_length,
            content_type: info.content_type,
            url: info.effective_url,
            error,
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// True when a response arrived with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.code)
    }
}
