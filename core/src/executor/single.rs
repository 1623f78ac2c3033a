//! Executor that finishes every request inside `submit`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{Executor, Mode};
use crate::config::ExecutorConfig;
use crate::error::SubmitError;
use crate::future::ResultFuture;
use crate::handle::RequestHandle;
use crate::headers::HeaderSink;
use crate::http::HttpRequest;
use crate::transport::blocking::BlockingTransport;
use crate::types::ResponseRecord;

/// Runs each request to completion on the calling thread.
///
/// Results are available as soon as `submit` returns, so none of the lookup
/// methods ever wait.
pub struct SingleExecutor {
    transport: BlockingTransport,
    responses: Mutex<HashMap<RequestHandle, ResponseRecord>>,
}

impl SingleExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            transport: BlockingTransport::new(config),
            responses: Mutex::new(HashMap::new()),
        }
    }

    fn responses(&self) -> MutexGuard<'_, HashMap<RequestHandle, ResponseRecord>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SingleExecutor {
    fn default() -> Self {
        Self::new(&ExecutorConfig::default())
    }
}

impl Executor for SingleExecutor {
    fn mode(&self) -> Mode {
        Mode::Single
    }

    #[tracing::instrument(level = "debug", skip_all, fields(method = %request.method, url = %request.url))]
    fn submit(&self, request: HttpRequest) -> Result<ResultFuture<'_>, SubmitError> {
        let handle = RequestHandle::next();
        let headers = HeaderSink::new();
        let (body, info, error) = self.transport.execute(&request, &headers)?;
        let record = ResponseRecord::from_parts(body, headers.take(), info, error);
        debug!(%handle, code = record.code, "request complete");

        self.responses().insert(handle, record);
        Ok(ResultFuture::new(handle, self))
    }

    fn get_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        self.try_result(handle)
    }

    fn get_result_timeout(&self, handle: RequestHandle, _timeout: Duration) -> Option<ResponseRecord> {
        self.try_result(handle)
    }

    fn try_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        self.responses().get(&handle).cloned()
    }

    fn take_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        self.responses().remove(&handle)
    }

    fn cancel(&self, _handle: RequestHandle) -> bool {
        false
    }
}
