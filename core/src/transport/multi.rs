//! [`Multiplexer`] backed by `reqwest` tasks on one owned tokio runtime.
//!
//! Every transfer is a task on the same reactor, so all sockets share one
//! readiness loop. Finished tasks report over a channel; `wait` notices
//! them, `perform` marks them finished and `info_read` hands them out.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{AddStatus, CompletedTransfer, Multiplexer, PerformStatus};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, SubmitError, TransferError};
use crate::handle::RequestHandle;
use crate::headers::HeaderSink;
use crate::http::{HttpMethod, HttpRequest};
use crate::types::TransferInfo;

pub struct ReqwestMultiplexer {
    // Always `Some` until drop.
    runtime: Option<Runtime>,
    client: reqwest::Client,
    transfers: HashMap<RequestHandle, Transfer>,
    finished: HashSet<RequestHandle>,
    done_tx: Sender<CompletedTransfer>,
    done_rx: Receiver<CompletedTransfer>,
    /// Seen by `wait`, not yet processed by `perform`.
    arrived: VecDeque<CompletedTransfer>,
    /// Processed by `perform`, waiting for `info_read`.
    ready: VecDeque<CompletedTransfer>,
}

struct Transfer {
    task: JoinHandle<()>,
    url: String,
    started: Instant,
}

impl ReqwestMultiplexer {
    pub fn new(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("fanout-transport")
            .enable_all()
            .build()
            .map_err(ExecutorError::Runtime)?;

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = {
            let _guard = runtime.enter();
            builder
                .build()
                .map_err(|e| ExecutorError::Client(e.to_string()))?
        };

        let (done_tx, done_rx) = mpsc::channel();
        Ok(Self {
            runtime: Some(runtime),
            client,
            transfers: HashMap::new(),
            finished: HashSet::new(),
            done_tx,
            done_rx,
            arrived: VecDeque::new(),
            ready: VecDeque::new(),
        })
    }

    fn build_request(&self, request: &HttpRequest) -> Result<reqwest::Request, SubmitError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| SubmitError::InvalidRequest(format!("{}: {e}", request.url)))?;
        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| SubmitError::InvalidRequest(e.to_string()))
    }

    /// Report tasks that ended without sending a completion (aborted by the
    /// runtime or panicked) as failed, so they stop counting as running.
    fn reap_silent(&mut self) {
        let silent: Vec<RequestHandle> = self
            .transfers
            .iter()
            .filter(|(handle, transfer)| {
                transfer.task.is_finished() && !self.finished.contains(*handle)
            })
            .map(|(handle, _)| *handle)
            .collect();
        if silent.is_empty() {
            return;
        }
        // A finished task has already sent whatever it was going to send.
        while let Ok(done) = self.done_rx.try_recv() {
            self.accept(done);
        }
        for handle in silent {
            let Some(transfer) = self.transfers.get(&handle) else {
                continue;
            };
            if self.finished.contains(&handle) {
                continue;
            }
            warn!(%handle, url = %transfer.url, "transfer task ended without reporting");
            let done = CompletedTransfer {
                handle,
                body: Vec::new(),
                info: TransferInfo {
                    total_time: transfer.started.elapsed().as_secs_f64(),
                    effective_url: transfer.url.clone(),
                    ..TransferInfo::default()
                },
                error: Some(TransferError::Other(
                    "transfer task ended without a result".to_string(),
                )),
            };
            self.accept(done);
        }
    }

    fn accept(&mut self, done: CompletedTransfer) {
        // A cancelled transfer may still have raced a completion into the channel.
        if self.transfers.contains_key(&done.handle) && self.finished.insert(done.handle) {
            self.ready.push_back(done);
        }
    }
}

impl Multiplexer for ReqwestMultiplexer {
    fn add(
        &mut self,
        handle: RequestHandle,
        request: HttpRequest,
        headers: HeaderSink,
    ) -> Result<AddStatus, SubmitError> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(SubmitError::ShutDown);
        };
        let built = self.build_request(&request)?;
        let client = self.client.clone();
        let done_tx = self.done_tx.clone();
        let started = Instant::now();

        let task = runtime.spawn(async move {
            let done = run_transfer(client, built, handle, headers, started).await;
            // The receiver only disappears when the multiplexer is dropped.
            let _ = done_tx.send(done);
        });
        self.transfers.insert(
            handle,
            Transfer {
                task,
                url: request.url.clone(),
                started,
            },
        );
        debug!(%handle, url = %request.url, "transfer spawned");
        Ok(AddStatus::Ok)
    }

    fn perform(&mut self) -> PerformStatus {
        while let Some(done) = self.arrived.pop_front() {
            self.accept(done);
        }
        while let Ok(done) = self.done_rx.try_recv() {
            self.accept(done);
        }
        self.reap_silent();
        PerformStatus {
            running: self.transfers.len() - self.finished.len(),
            call_again: false,
        }
    }

    fn wait(&mut self, timeout: Duration) -> usize {
        if self.arrived.is_empty() {
            let first = if timeout.is_zero() {
                self.done_rx.try_recv().ok()
            } else {
                match self.done_rx.recv_timeout(timeout) {
                    Ok(done) => Some(done),
                    Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
                }
            };
            self.arrived.extend(first);
        }
        while let Ok(done) = self.done_rx.try_recv() {
            self.arrived.push_back(done);
        }
        trace!(ready = self.arrived.len(), "wait");
        self.arrived.len()
    }

    fn info_read(&mut self) -> Option<CompletedTransfer> {
        self.ready.pop_front()
    }

    fn remove(&mut self, handle: RequestHandle) -> bool {
        let Some(transfer) = self.transfers.remove(&handle) else {
            return false;
        };
        transfer.task.abort();
        self.finished.remove(&handle);
        self.arrived.retain(|done| done.handle != handle);
        self.ready.retain(|done| done.handle != handle);
        true
    }
}

impl Drop for ReqwestMultiplexer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Safe to call from inside another runtime, unlike a plain drop.
            runtime.shutdown_background();
        }
    }
}

async fn run_transfer(
    client: reqwest::Client,
    request: reqwest::Request,
    handle: RequestHandle,
    headers: HeaderSink,
    started: Instant,
) -> CompletedTransfer {
    let requested_url = request.url().to_string();
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            let info = TransferInfo {
                total_time: started.elapsed().as_secs_f64(),
                effective_url: err.url().map(|u| u.to_string()).unwrap_or(requested_url),
                ..TransferInfo::default()
            };
            return CompletedTransfer {
                handle,
                body: Vec::new(),
                info,
                error: Some(classify(&err)),
            };
        }
    };

    for (name, value) in response.headers() {
        let mut line = Vec::with_capacity(name.as_str().len() + value.len() + 4);
        line.extend_from_slice(name.as_str().as_bytes());
        line.extend_from_slice(b": ");
        line.extend_from_slice(value.as_bytes());
        line.extend_from_slice(b"\r\n");
        headers.push_line(&line);
    }

    let code = response.status().as_u16();
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let effective_url = response.url().to_string();

    let (body, error) = match response.bytes().await {
        Ok(bytes) => (bytes.to_vec(), None),
        Err(err) => (Vec::new(), Some(classify(&err))),
    };

    CompletedTransfer {
        handle,
        body,
        info: TransferInfo {
            code,
            total_time: started.elapsed().as_secs_f64(),
            content_length,
            content_type,
            effective_url,
        },
        error,
    }
}

fn classify(err: &reqwest::Error) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout
    } else if err.is_connect() {
        TransferError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransferError::Body(err.to_string())
    } else {
        TransferError::Other(err.to_string())
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}
