//! Transport collaborators.
//!
//! # Design
//! The executors never touch sockets. Multiplexed mode talks to a
//! [`Multiplexer`], an object that keeps many transfers in flight and is
//! stepped from the outside: register, `perform`, `wait`, read completions,
//! `remove`. Single mode uses a blocking one-shot transport instead.
//!
//! `Multiplexer` is a trait so the poll loop can be driven by a scripted
//! implementation in tests; production code uses [`ReqwestMultiplexer`].

use std::time::Duration;

use crate::error::{SubmitError, TransferError};
use crate::handle::RequestHandle;
use crate::headers::HeaderSink;
use crate::http::HttpRequest;
use crate::types::TransferInfo;

pub(crate) mod blocking;
mod multi;

pub use multi::ReqwestMultiplexer;

/// Successful outcomes of [`Multiplexer::add`].
///
/// Both variants mean the transfer was accepted. `CallAgain` additionally
/// hints that `perform` has immediate work to start it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    Ok,
    CallAgain,
}

/// Result of one non-blocking [`Multiplexer::perform`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformStatus {
    /// Transfers that have not finished yet.
    pub running: usize,
    /// More work can be done right now without waiting for I/O.
    pub call_again: bool,
}

/// A finished transfer, as reported by [`Multiplexer::info_read`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransfer {
    pub handle: RequestHandle,
    pub body: Vec<u8>,
    pub info: TransferInfo,
    pub error: Option<TransferError>,
}

/// Drives many transfers cooperatively.
///
/// Implementations are only ever called from one thread at a time; the
/// executor serializes every call behind its state lock.
pub trait Multiplexer: Send {
    /// Register a transfer. `headers` receives each response header line, in
    /// wire order, before the transfer is reported complete.
    fn add(
        &mut self,
        handle: RequestHandle,
        request: HttpRequest,
        headers: HeaderSink,
    ) -> Result<AddStatus, SubmitError>;

    /// Make whatever progress is possible without blocking.
    fn perform(&mut self) -> PerformStatus;

    /// Wait up to `timeout` for activity; returns the number of ready events.
    fn wait(&mut self, timeout: Duration) -> usize;

    /// Pop one completed transfer, if any.
    fn info_read(&mut self) -> Option<CompletedTransfer>;

    /// Detach a transfer, aborting it if still running. Returns false for an
    /// unknown handle.
    fn remove(&mut self, handle: RequestHandle) -> bool;
}
