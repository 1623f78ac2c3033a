//! Process-unique identity of a submitted request.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Correlates a submission with its eventual result.
///
/// Handles come from one process-wide counter, so two executors never hand
/// out the same value and a handle is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestHandle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_strictly_increasing() {
        let a = RequestHandle::next();
        let b = RequestHandle::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn display_includes_counter() {
        assert_eq!(RequestHandle::from(7).to_string(), "req#7");
    }
}
