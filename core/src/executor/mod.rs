//! Executors: the objects callers submit requests to.
//!
//! # Design
//! Both executors share one trait so callers (and [`crate::ResultFuture`])
//! never care which mode they got. `get_result` blocks until the handle's
//! result exists; `try_result` never blocks. Unknown handles are `None` in
//! every variant and never block.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ExecutorError, SubmitError};
use crate::future::ResultFuture;
use crate::handle::RequestHandle;
use crate::http::HttpRequest;
use crate::types::ResponseRecord;

mod multiplexed;
mod single;

pub use multiplexed::MultiplexedExecutor;
pub use single::SingleExecutor;

/// Closed set of executor flavors held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Run each request to completion inside `submit`.
    Single,
    /// Register with a shared multiplexer and return immediately.
    Multiplexed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Single => f.write_str("single"),
            Mode::Multiplexed => f.write_str("multiplexed"),
        }
    }
}

impl FromStr for Mode {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "easy" => Ok(Mode::Single),
            "multiplexed" | "multi" => Ok(Mode::Multiplexed),
            other => Err(ExecutorError::UnknownMode(other.to_string())),
        }
    }
}

pub trait Executor: Send + Sync {
    fn mode(&self) -> Mode;

    /// Hand over a request. The returned future borrows the executor, which
    /// therefore outlives every future it issues.
    fn submit(&self, request: HttpRequest) -> Result<ResultFuture<'_>, SubmitError>;

    /// Block until `handle` completes. `None` when the handle is unknown or
    /// the transport stopped running without ever completing it.
    fn get_result(&self, handle: RequestHandle) -> Option<ResponseRecord>;

    /// Like [`Executor::get_result`] but gives up after `timeout`.
    fn get_result_timeout(&self, handle: RequestHandle, timeout: Duration) -> Option<ResponseRecord>;

    /// The stored record, if the handle has already completed.
    fn try_result(&self, handle: RequestHandle) -> Option<ResponseRecord>;

    /// Remove and return a completed record, releasing its memory.
    fn take_result(&self, handle: RequestHandle) -> Option<ResponseRecord>;

    /// Abort an in-flight transfer. Returns false if it was not in flight.
    fn cancel(&self, handle: RequestHandle) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_both_spellings() {
        assert_eq!("single".parse::<Mode>().unwrap(), Mode::Single);
        assert_eq!("Easy".parse::<Mode>().unwrap(), Mode::Single);
        assert_eq!("multi".parse::<Mode>().unwrap(), Mode::Multiplexed);
        assert_eq!(" multiplexed ".parse::<Mode>().unwrap(), Mode::Multiplexed);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = "parallel".parse::<Mode>().unwrap_err();
        assert!(matches!(err, ExecutorError::UnknownMode(m) if m == "parallel"));
    }

    #[test]
    fn mode_display_roundtrips() {
        for mode in [Mode::Single, Mode::Multiplexed] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }
}
