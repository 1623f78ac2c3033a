//! Lazy, read-through result handles.
//!
//! # Design
//! A `ResultFuture` is only a `(handle, &executor)` pair. It stores nothing:
//! every accessor asks the executor again. Once the request has completed
//! that lookup is a map read; before completion each accessor blocks until
//! the executor has the result. Completion is monotonic, so repeated access
//! always observes the same record.

use std::fmt;
use std::time::Duration;

use crate::error::TransferError;
use crate::executor::Executor;
use crate::handle::RequestHandle;
use crate::types::{Headers, ResponseRecord};

#[derive(Clone, Copy)]
pub struct ResultFuture<'a> {
    handle: RequestHandle,
    executor: &'a dyn Executor,
}

impl<'a> ResultFuture<'a> {
    pub(crate) fn new(handle: RequestHandle, executor: &'a dyn Executor) -> Self {
        Self { handle, executor }
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    /// Block until the record exists. `None` means the executor never knew
    /// the handle or lost the transfer.
    pub fn resolve(&self) -> Option<ResponseRecord> {
        self.executor.get_result(self.handle)
    }

    pub fn resolve_timeout(&self, timeout: Duration) -> Option<ResponseRecord> {
        self.executor.get_result_timeout(self.handle, timeout)
    }

    /// Non-blocking lookup.
    pub fn try_resolve(&self) -> Option<ResponseRecord> {
        self.executor.try_result(self.handle)
    }

    /// True once the result is available; never blocks.
    pub fn is_ready(&self) -> bool {
        self.try_resolve().is_some()
    }

    pub fn cancel(&self) -> bool {
        self.executor.cancel(self.handle)
    }

    pub fn data(&self) -> Option<Vec<u8>> {
        self.resolve().map(|r| r.data)
    }

    /// Body as UTF-8 text, lossily decoded.
    pub fn text(&self) -> Option<String> {
        self.resolve().map(|r| r.text())
    }

    pub fn headers(&self) -> Option<Headers> {
        self.resolve().map(|r| r.headers)
    }

    pub fn code(&self) -> Option<u16> {
        self.resolve().map(|r| r.code)
    }

    pub fn time(&self) -> Option<f64> {
        self.resolve().map(|r| r.time)
    }

    /// Declared content length. The outer `None` means no result; the inner
    /// one means the server did not declare a length.
    pub fn length(&self) -> Option<Option<u64>> {
        self.resolve().map(|r| r.length)
    }

    pub fn content_type(&self) -> Option<Option<String>> {
        self.resolve().map(|r| r.content_type)
    }

    pub fn url(&self) -> Option<String> {
        self.resolve().map(|r| r.url)
    }

    pub fn error(&self) -> Option<Option<TransferError>> {
        self.resolve().map(|r| r.error)
    }
}

impl fmt::Debug for ResultFuture<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFuture")
            .field("handle", &self.handle)
            .field("mode", &self.executor.mode())
            .finish()
    }
}
