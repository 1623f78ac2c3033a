//! One-shot synchronous transport used by the single-request executor.
//!
//! Runs a request to completion on the calling thread with `ureq`. Status
//! codes are data, not errors: 4xx/5xx responses come back as records.

use std::time::{Duration, Instant};

use tracing::debug;
use ureq::http;
use ureq::ResponseExt;

use crate::config::ExecutorConfig;
use crate::error::{SubmitError, TransferError};
use crate::headers::HeaderSink;
use crate::http::HttpRequest;
use crate::types::TransferInfo;

/// Body, metadata and failure (if any) of one finished transfer.
pub(crate) type Outcome = (Vec<u8>, TransferInfo, Option<TransferError>);

#[derive(Clone)]
pub(crate) struct BlockingTransport {
    agent: ureq::Agent,
    config: ExecutorConfig,
}

impl BlockingTransport {
    pub(crate) fn new(config: &ExecutorConfig) -> Self {
        Self {
            agent: build_agent(config, None),
            config: config.clone(),
        }
    }

    pub(crate) fn execute(
        &self,
        request: &HttpRequest,
        headers: &HeaderSink,
    ) -> Result<Outcome, SubmitError> {
        let custom;
        let agent = match request.timeout {
            Some(timeout) => {
                custom = build_agent(&self.config, Some(timeout));
                &custom
            }
            None => &self.agent,
        };

        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let result = match &request.body {
            Some(body) => builder
                .body(body.clone())
                .map_err(|e| SubmitError::InvalidRequest(e.to_string()))
                .map(|req| agent.run(req))?,
            None => builder
                .body(())
                .map_err(|e| SubmitError::InvalidRequest(e.to_string()))
                .map(|req| agent.run(req))?,
        };

        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %request.url, error = %err, "transfer failed");
                let info = TransferInfo {
                    total_time: started.elapsed().as_secs_f64(),
                    effective_url: request.url.clone(),
                    ..TransferInfo::default()
                };
                return Ok((Vec::new(), info, Some(classify(err))));
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
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let effective_url = response.get_uri().to_string();

        let (body, error) = match response.body_mut().read_to_vec() {
            Ok(body) => (body, None),
            Err(err) => (Vec::new(), Some(TransferError::Body(err.to_string()))),
        };

        let info = TransferInfo {
            code,
            total_time: started.elapsed().as_secs_f64(),
            content_length,
            content_type,
            effective_url,
        };
        Ok((body, info, error))
    }
}

/// Status codes are returned as data so the executor, not the transport,
/// decides what a 404 means.
fn build_agent(config: &ExecutorConfig, timeout: Option<Duration>) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .user_agent(config.user_agent.as_str())
        .max_redirects(u32::try_from(config.max_redirects).unwrap_or(u32::MAX))
        .timeout_connect(config.connect_timeout())
        .timeout_global(timeout)
        .build()
        .new_agent()
}

fn classify(err: ureq::Error) -> TransferError {
    match err {
        ureq::Error::Timeout(_) => TransferError::Timeout,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            TransferError::Connect(err.to_string())
        }
        other => TransferError::Other(other.to_string()),
    }
}
