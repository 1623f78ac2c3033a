//! Executor that keeps many transfers in flight over one [`Multiplexer`].
//!
//! # Design
//! Each executor owns one driver thread. The driver is the only code that
//! steps the multiplexer after registration, so no two threads ever call
//! `perform`/`wait`/`info_read` concurrently. Callers that want a result
//! block on a condition variable that the driver signals after each drain.
//!
//! One driver round:
//! 1. sleep the outer backoff interval (lock released);
//! 2. `wait(0)` for readiness;
//! 3. if anything is ready, `perform` until it stops asking to be called
//!    again, sleeping the inner backoff between steps;
//! 4. drain every completed transfer into `responses` and wake waiters.
//!
//! The driver parks while nothing is in flight and restarts the outer
//! backoff from its base when new work arrives.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use super::{Executor, Mode};
use crate::backoff::Backoff;
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, SubmitError, TransferError};
use crate::future::ResultFuture;
use crate::handle::RequestHandle;
use crate::headers::HeaderSink;
use crate::http::HttpRequest;
use crate::transport::{Multiplexer, ReqwestMultiplexer};
use crate::types::ResponseRecord;

pub struct MultiplexedExecutor {
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled after every drain, cancellation and shutdown.
    completed: Condvar,
    /// Signalled when work arrives or shutdown is requested.
    work: Condvar,
    config: ExecutorConfig,
}

struct State {
    multiplexer: Box<dyn Multiplexer>,
    requests: HashMap<RequestHandle, InFlight>,
    responses: HashMap<RequestHandle, ResponseRecord>,
    running: usize,
    shutdown: bool,
}

struct InFlight {
    headers: HeaderSink,
    url: String,
    submitted: Instant,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    /// Move every transfer the multiplexer reports as done into `responses`.
    fn store_responses(&mut self) -> usize {
        let mut stored = 0;
        while let Some(done) = self.multiplexer.info_read() {
            self.multiplexer.remove(done.handle);
            let Some(transfer) = self.requests.remove(&done.handle) else {
                trace!(handle = %done.handle, "completion for a handle no longer in flight");
                continue;
            };
            let record =
                ResponseRecord::from_parts(done.body, transfer.headers.take(), done.info, done.error);
            debug!(handle = %done.handle, code = record.code, "transfer complete");
            self.responses.insert(done.handle, record);
            stored += 1;
        }
        stored
    }

    /// Drop in-flight handles the multiplexer no longer runs. Waiters on them
    /// observe "not found".
    fn discard_lost(&mut self) -> usize {
        if self.running > 0 || self.requests.is_empty() {
            return 0;
        }
        let lost = self.requests.len();
        for (handle, transfer) in self.requests.drain() {
            warn!(%handle, url = %transfer.url, "transport stopped without completing transfer");
            self.multiplexer.remove(handle);
        }
        lost
    }

    fn perform_until_idle(&mut self) {
        loop {
            let status = self.multiplexer.perform();
            self.running = status.running;
            if !status.call_again {
                break;
            }
        }
    }
}

impl MultiplexedExecutor {
    /// Build an executor on the default `reqwest` transport.
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        let multiplexer = ReqwestMultiplexer::new(&config)?;
        Self::with_multiplexer(multiplexer, config)
    }

    /// Build an executor around any [`Multiplexer`].
    pub fn with_multiplexer(
        multiplexer: impl Multiplexer + 'static,
        config: ExecutorConfig,
    ) -> Result<Self, ExecutorError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                multiplexer: Box::new(multiplexer),
                requests: HashMap::new(),
                responses: HashMap::new(),
                running: 0,
                shutdown: false,
            }),
            completed: Condvar::new(),
            work: Condvar::new(),
            config,
        });

        let driver_shared = Arc::clone(&shared);
        let driver = std::thread::Builder::new()
            .name("fanout-driver".to_string())
            .spawn(move || drive(&driver_shared))
            .map_err(ExecutorError::Driver)?;

        Ok(Self {
            shared,
            driver: Some(driver),
        })
    }

    /// Transfers reported as running by the last `perform`.
    pub fn running(&self) -> usize {
        self.shared.lock().running
    }

    /// Handles submitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().requests.len()
    }

    /// Completed records currently held.
    pub fn completed(&self) -> usize {
        self.shared.lock().responses.len()
    }

    /// Stop the driver. In-flight handles resolve to `None` afterwards.
    pub fn shutdown(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.work.notify_all();
        self.shared.completed.notify_all();
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                warn!("driver thread panicked");
            }
        }
    }
}

impl Executor for MultiplexedExecutor {
    fn mode(&self) -> Mode {
        Mode::Multiplexed
    }

    #[tracing::instrument(level = "debug", skip_all, fields(method = %request.method, url = %request.url))]
    fn submit(&self, request: HttpRequest) -> Result<ResultFuture<'_>, SubmitError> {
        let handle = RequestHandle::next();
        let headers = HeaderSink::new();
        let url = request.url.clone();

        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(SubmitError::ShutDown);
        }
        let status = match state.multiplexer.add(handle, request, headers.clone()) {
            Ok(status) => status,
            Err(err) => {
                warn!(%handle, error = %err, "registration failed");
                return Err(err);
            }
        };
        state.requests.insert(
            handle,
            InFlight {
                headers,
                url,
                submitted: Instant::now(),
            },
        );
        state.perform_until_idle();
        debug!(%handle, ?status, running = state.running, "transfer registered");
        drop(state);

        self.shared.work.notify_one();
        Ok(ResultFuture::new(handle, self))
    }

    fn get_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        let mut state = self.shared.lock();
        loop {
            if let Some(record) = state.responses.get(&handle) {
                return Some(record.clone());
            }
            if state.shutdown || !state.requests.contains_key(&handle) {
                return None;
            }
            state = self
                .shared
                .completed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn get_result_timeout(&self, handle: RequestHandle, timeout: Duration) -> Option<ResponseRecord> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(record) = state.responses.get(&handle) {
                return Some(record.clone());
            }
            if state.shutdown || !state.requests.contains_key(&handle) {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .shared
                .completed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn try_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        self.shared.lock().responses.get(&handle).cloned()
    }

    fn take_result(&self, handle: RequestHandle) -> Option<ResponseRecord> {
        self.shared.lock().responses.remove(&handle)
    }

    fn cancel(&self, handle: RequestHandle) -> bool {
        let mut state = self.shared.lock();
        let Some(transfer) = state.requests.remove(&handle) else {
            return false;
        };
        state.multiplexer.remove(handle);
        let record = ResponseRecord {
            headers: transfer.headers.take(),
            time: transfer.submitted.elapsed().as_secs_f64(),
            url: transfer.url,
            error: Some(TransferError::Cancelled),
            ..ResponseRecord::default()
        };
        state.responses.insert(handle, record);
        debug!(%handle, "transfer cancelled");
        drop(state);

        self.shared.completed.notify_all();
        true
    }
}

impl Drop for MultiplexedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Marks the executor shut down when the driver exits, including by panic,
/// so blocked callers wake up and see "not found".
struct DriverExit<'a> {
    shared: &'a Shared,
}

impl Drop for DriverExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("driver thread panicked; in-flight requests will resolve to None");
        }
        self.shared.lock().shutdown = true;
        self.shared.completed.notify_all();
    }
}

fn drive(shared: &Shared) {
    let _exit = DriverExit { shared };
    let mut outer = Backoff::new(shared.config.backoff.clone());
    let mut inner = Backoff::new(shared.config.inner_backoff.clone());

    loop {
        {
            let mut state = shared.lock();
            while !state.shutdown && state.requests.is_empty() {
                state = shared.work.wait(state).unwrap_or_else(PoisonError::into_inner);
                outer.reset();
            }
            if state.shutdown {
                debug!("driver stopping");
                return;
            }
        }

        outer.sleep();

        let ready = shared.lock().multiplexer.wait(Duration::ZERO);
        if ready > 0 {
            loop {
                let status = {
                    let mut state = shared.lock();
                    let status = state.multiplexer.perform();
                    state.running = status.running;
                    status
                };
                if !status.call_again {
                    break;
                }
                inner.sleep();
            }
            inner.reset();
        }

        let mut state = shared.lock();
        let stored = state.store_responses();
        let lost = state.discard_lost();
        trace!(ready, stored, lost, running = state.running, "poll round");
        drop(state);

        if stored > 0 || lost > 0 {
            outer.reset();
            shared.completed.notify_all();
        }
    }
}
