//! Deferred, batched execution of outbound HTTP(S) requests.
//!
//! # Overview
//! Callers submit requests and get a [`ResultFuture`] back immediately. The
//! future blocks only when a field is read before its transfer has finished.
//! In multiplexed mode every transfer rides one shared event loop, so dozens
//! of requests progress concurrently without a thread per request.
//!
//! # Design
//! - [`MultiplexedExecutor`] owns one [`Multiplexer`] and a driver thread that
//!   steps it with a capped backoff, draining every finished transfer per
//!   round and waking all waiting callers.
//! - [`SingleExecutor`] runs each request inline; results exist as soon as
//!   `submit` returns.
//! - [`ResultFuture`] is a `(handle, &executor)` pair that re-queries on
//!   every access.
//! - [`ExecutorRegistry`] hands out one executor per [`Mode`]; [`executor`]
//!   reads a process-wide registry for callers that cannot inject one.
//! - Transport failures still complete the request: status 0, empty body
//!   and an explicit [`TransferError`] on the record.
//!
//! ```no_run
//! use fanout_core::{executor, HttpRequest, Mode};
//!
//! let exec = executor(Mode::Multiplexed)?;
//! let a = exec.submit(HttpRequest::get("https://example.com/a"))?;
//! let b = exec.submit(HttpRequest::get("https://example.com/b"))?;
//! println!("{:?} {:?}", a.code(), b.code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod handle;
pub mod headers;
pub mod http;
pub mod registry;
pub mod transport;
pub mod types;

pub use config::{BackoffConfig, ExecutorConfig};
pub use error::{ExecutorError, SubmitError, TransferError};
pub use executor::{Executor, Mode, MultiplexedExecutor, SingleExecutor};
pub use future::ResultFuture;
pub use handle::RequestHandle;
pub use headers::{parse_header_line, HeaderSink};
pub use http::{HttpMethod, HttpRequest};
pub use registry::{executor, global, init, ExecutorRegistry};
pub use transport::{AddStatus, CompletedTransfer, Multiplexer, PerformStatus, ReqwestMultiplexer};
pub use types::{Headers, ResponseRecord, TransferInfo};
