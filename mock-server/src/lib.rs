//! Fixture HTTP server for exercising the fanout executors over real sockets.
//!
//! Every route is deterministic: bodies and headers depend only on the path,
//! so tests can assert exact values without coordinating shared state.

use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Body returned by `/ok`.
pub const OK_BODY: &str = "ok";

/// Upper bound for `/delay/{ms}` so a typo cannot hang a test run.
pub const MAX_DELAY_MS: u64 = 10_000;

/// JSON shape returned by `/headers`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EchoedHeaders {
    pub headers: BTreeMap<String, String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/delay/{ms}", get(delay))
        .route("/status/{code}", get(status))
        .route("/echo", post(echo))
        .route("/redirect/{n}", get(redirect))
        .route("/id/{n}", get(id))
        .route("/headers", get(headers))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::debug!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn ok() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("X-Test", "1"), ("Content-Type", "text/plain")],
        OK_BODY,
    )
}

async fn delay(Path(ms): Path<u64>) -> Result<String, StatusCode> {
    if ms > MAX_DELAY_MS {
        return Err(StatusCode::BAD_REQUEST);
    }
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(format!("delayed {ms}"))
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(code) => (code, format!("status {}", code.as_u16())).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn redirect(Path(n): Path<u32>) -> Redirect {
    if n == 0 {
        Redirect::temporary("/ok")
    } else {
        Redirect::temporary(&format!("/redirect/{}", n - 1))
    }
}

async fn id(Path(n): Path<u64>) -> String {
    format!("id-{n}")
}

async fn headers(headers: HeaderMap) -> Json<EchoedHeaders> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Json(EchoedHeaders { headers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoed_headers_serializes_sorted() {
        let mut headers = BTreeMap::new();
        headers.insert("x-b".to_string(), "2".to_string());
        headers.insert("x-a".to_string(), "1".to_string());
        let json = serde_json::to_string(&EchoedHeaders { headers }).unwrap();
        assert_eq!(json, r#"{"headers":{"x-a":"1","x-b":"2"}}"#);
    }

    #[test]
    fn echoed_headers_roundtrips_through_json() {
        let input: EchoedHeaders =
            serde_json::from_str(r#"{"headers":{"user-agent":"fanout"}}"#).unwrap();
        assert_eq!(input.headers["user-agent"], "fanout");
    }

    #[test]
    fn echoed_headers_rejects_missing_field() {
        let result: Result<EchoedHeaders, _> = serde_json::from_str(r#"{}"#);
        assert!(result.is_err());
    }
}
