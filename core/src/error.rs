//! Error types for submission, executor construction and individual transfers.
//!
//! # Design
//! Only two things fail loudly: building an executor and handing it a request
//! it cannot register. A transfer that fails on the wire still completes; its
//! [`TransferError`] rides along in the `ResponseRecord` so callers read it
//! the same way they read a status code. "Not found" is `None`, never an
//! error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::RequestHandle;

/// Returned synchronously from `Executor::submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The multiplexer refused to take the transfer.
    #[error("multiplexer rejected {handle}: {reason}")]
    Rejected { handle: RequestHandle, reason: String },

    /// The request could not be turned into a transfer (bad URL, header...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The executor is shutting down and no longer accepts work.
    #[error("executor is shut down")]
    ShutDown,
}

/// Failures while building or looking up an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to start transport runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn driver thread: {0}")]
    Driver(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("unknown executor mode: {0}")]
    UnknownMode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("executor registry already initialized")]
    AlreadyInitialized,
}

/// Why a transfer finished without a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferError {
    #[error("transfer timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed reading response body: {0}")]
    Body(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transfer failed: {0}")]
    Other(String),
}
