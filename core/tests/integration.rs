//! Executors against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port in a background runtime, then
//! drives both executors over real HTTP. Each test gets its own server and
//! its own executor so failures stay isolated.

use std::net::SocketAddr;
use std::time::Duration;

use fanout_core::{
    Executor, ExecutorConfig, ExecutorRegistry, HttpRequest, Mode, MultiplexedExecutor,
    SingleExecutor, TransferError,
};
use tracing_test::traced_test;

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

/// An address nothing listens on.
fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn multiplexed() -> MultiplexedExecutor {
    MultiplexedExecutor::new(ExecutorConfig::default()).unwrap()
}

fn single() -> SingleExecutor {
    SingleExecutor::new(&ExecutorConfig::default())
}

fn both_with(config: ExecutorConfig) -> (MultiplexedExecutor, SingleExecutor) {
    let single = SingleExecutor::new(&config);
    (MultiplexedExecutor::new(config).unwrap(), single)
}

fn assert_ok_endpoint(executor: &dyn Executor, addr: SocketAddr) {
    let url = format!("http://{addr}/ok");
    let future = executor.submit(HttpRequest::get(&url)).unwrap();

    let record = future.resolve().expect("ok endpoint must resolve");
    assert_eq!(record.data, b"ok");
    assert_eq!(record.code, 200);
    assert_eq!(record.headers.get("X-Test"), Some("1"));
    assert_eq!(record.content_type.as_deref(), Some("text/plain"));
    assert_eq!(record.length, Some(2));
    assert_eq!(record.url, url);
    assert!(record.time > 0.0);
    assert!(record.error.is_none());
}

#[test]
#[traced_test]
fn ok_endpoint_multiplexed() {
    let addr = start_server();
    assert_ok_endpoint(&multiplexed(), addr);
}

#[test]
fn ok_endpoint_single() {
    let addr = start_server();
    assert_ok_endpoint(&single(), addr);
}

#[test]
fn field_accessors_match_record() {
    let addr = start_server();
    let executor = multiplexed();
    let future = executor.submit(HttpRequest::get(format!("http://{addr}/ok"))).unwrap();

    assert_eq!(future.text().as_deref(), Some("ok"));
    assert_eq!(future.code(), Some(200));
    assert_eq!(future.headers().unwrap().get("x-test"), Some("1"));
    assert_eq!(future.length(), Some(Some(2)));
    assert_eq!(future.content_type(), Some(Some("text/plain".to_string())));
    assert_eq!(future.error(), Some(None));
    assert!(future.is_ready());
}

#[test]
fn fast_request_does_not_wait_for_slow_one() {
    let addr = start_server();
    let executor = multiplexed();

    let slow = executor
        .submit(HttpRequest::get(format!("http://{addr}/delay/500")))
        .unwrap();
    let fast = executor
        .submit(HttpRequest::get(format!("http://{addr}/delay/10")))
        .unwrap();

    assert_eq!(fast.text().as_deref(), Some("delayed 10"));
    assert!(!slow.is_ready(), "slow transfer finished before the fast one");
    assert_eq!(slow.text().as_deref(), Some("delayed 500"));
}

#[test]
fn many_requests_return_distinct_bodies() {
    let addr = start_server();
    let executor = multiplexed();

    let futures: Vec<_> = (0..24)
        .map(|n| {
            executor
                .submit(HttpRequest::get(format!("http://{addr}/id/{n}")))
                .unwrap()
        })
        .collect();

    // Read back in reverse submission order.
    for (n, future) in futures.iter().enumerate().rev() {
        assert_eq!(future.text().unwrap(), format!("id-{n}"));
    }
    assert_eq!(executor.in_flight(), 0);
    assert_eq!(executor.completed(), 24);
}

#[test]
fn many_requests_resolved_from_many_threads() {
    let addr = start_server();
    let executor = multiplexed();

    let futures: Vec<_> = (0..16)
        .map(|n| {
            executor
                .submit(HttpRequest::get(format!("http://{addr}/delay/{}", 5 * (n % 4))))
                .unwrap()
        })
        .collect();

    std::thread::scope(|scope| {
        for (n, future) in futures.iter().enumerate() {
            scope.spawn(move || {
                let expected = format!("delayed {}", 5 * (n % 4));
                assert_eq!(future.text().unwrap(), expected);
            });
        }
    });
}

#[test]
fn repeated_access_returns_same_value() {
    let addr = start_server();
    let executor = multiplexed();
    let future = executor.submit(HttpRequest::get(format!("http://{addr}/id/7"))).unwrap();

    let first = future.data().unwrap();
    for _ in 0..10 {
        assert_eq!(future.data().unwrap(), first);
    }
}

#[test]
fn error_statuses_are_data() {
    let addr = start_server();
    for executor in [&multiplexed() as &dyn Executor, &single()] {
        let future = executor
            .submit(HttpRequest::get(format!("http://{addr}/status/404")))
            .unwrap();
        let record = future.resolve().unwrap();
        assert_eq!(record.code, 404, "{:?}", executor.mode());
        assert_eq!(record.text(), "status 404");
        assert!(record.error.is_none());
        assert!(!record.is_success());
    }
}

#[test]
fn refused_connection_folds_into_record() {
    let addr = closed_addr();
    for executor in [&multiplexed() as &dyn Executor, &single()] {
        let future = executor.submit(HttpRequest::get(format!("http://{addr}/ok"))).unwrap();
        let record = future.resolve().unwrap();
        assert_eq!(record.code, 0, "{:?}", executor.mode());
        assert!(record.data.is_empty());
        assert!(
            matches!(record.error, Some(TransferError::Connect(_))),
            "{:?}: {:?}",
            executor.mode(),
            record.error
        );
    }
}

#[test]
fn redirects_report_effective_url() {
    let addr = start_server();
    for executor in [&multiplexed() as &dyn Executor, &single()] {
        let future = executor
            .submit(HttpRequest::get(format!("http://{addr}/redirect/2")))
            .unwrap();
        let record = future.resolve().unwrap();
        assert_eq!(record.code, 200, "{:?}", executor.mode());
        assert_eq!(record.url, format!("http://{addr}/ok"));
        assert_eq!(record.text(), "ok");
    }
}

#[test]
fn configured_user_agent_and_request_headers_are_sent() {
    let addr = start_server();
    let config = ExecutorConfig {
        user_agent: "fanout-tests/1".to_string(),
        ..ExecutorConfig::default()
    };
    let (multi, single) = both_with(config);
    for executor in [&multi as &dyn Executor, &single] {
        let request =
            HttpRequest::get(format!("http://{addr}/headers")).header("X-Trace", "abc123");
        let record = executor.submit(request).unwrap().resolve().unwrap();
        assert_eq!(record.code, 200, "{:?}", executor.mode());

        let echoed: mock_server::EchoedHeaders = serde_json::from_slice(&record.data).unwrap();
        assert_eq!(
            echoed.headers.get("user-agent").map(String::as_str),
            Some("fanout-tests/1"),
            "{:?}",
            executor.mode()
        );
        assert_eq!(
            echoed.headers.get("x-trace").map(String::as_str),
            Some("abc123"),
            "{:?}",
            executor.mode()
        );
    }
}

#[test]
fn redirect_limit_stops_the_chain() {
    let addr = start_server();
    let config = ExecutorConfig {
        max_redirects: 1,
        ..ExecutorConfig::default()
    };
    let (multi, single) = both_with(config);
    for executor in [&multi as &dyn Executor, &single] {
        let future = executor
            .submit(HttpRequest::get(format!("http://{addr}/redirect/3")))
            .unwrap();
        let record = future.resolve().unwrap();
        assert!(
            record.error.is_some() || (300..400).contains(&record.code),
            "{:?}: code {} error {:?}",
            executor.mode(),
            record.code,
            record.error
        );
        assert_ne!(record.url, format!("http://{addr}/ok"), "{:?}", executor.mode());
        assert_ne!(record.data, b"ok", "{:?}", executor.mode());
    }
}

#[test]
fn post_body_is_sent() {
    let addr = start_server();
    for executor in [&multiplexed() as &dyn Executor, &single()] {
        let request = HttpRequest::post(format!("http://{addr}/echo"), r#"{"n":1}"#)
            .header("Content-Type", "application/json");
        let record = executor.submit(request).unwrap().resolve().unwrap();
        assert_eq!(record.code, 200, "{:?}", executor.mode());
        assert_eq!(record.text(), r#"{"n":1}"#);
        assert_eq!(record.content_type.as_deref(), Some("application/json"));
    }
}

#[test]
fn request_timeout_is_reported() {
    let addr = start_server();
    for executor in [&multiplexed() as &dyn Executor, &single()] {
        let request = HttpRequest::get(format!("http://{addr}/delay/2000"))
            .timeout(Duration::from_millis(100));
        let record = executor.submit(request).unwrap().resolve().unwrap();
        assert_eq!(record.code, 0, "{:?}", executor.mode());
        assert_eq!(record.error, Some(TransferError::Timeout), "{:?}", executor.mode());
    }
}

#[test]
fn cancelled_transfer_resolves_immediately() {
    let addr = start_server();
    let executor = multiplexed();
    let future = executor
        .submit(HttpRequest::get(format!("http://{addr}/delay/5000")))
        .unwrap();

    assert!(future.cancel());
    let record = future
        .resolve_timeout(Duration::from_secs(1))
        .expect("cancelled transfer must resolve");
    assert_eq!(record.error, Some(TransferError::Cancelled));
    assert_eq!(executor.in_flight(), 0);
}

#[test]
fn registry_executor_serves_requests() {
    let addr = start_server();
    let registry = ExecutorRegistry::default();
    let executor = registry.get(Mode::Multiplexed).unwrap();

    let a = executor.submit(HttpRequest::get(format!("http://{addr}/id/1"))).unwrap();
    let b = registry
        .get(Mode::Multiplexed)
        .unwrap()
        .submit(HttpRequest::get(format!("http://{addr}/id/2")))
        .unwrap();

    assert_eq!(b.text().as_deref(), Some("id-2"));
    assert_eq!(a.text().as_deref(), Some("id-1"));
}

#[test]
fn global_executor_is_static() {
    let addr = start_server();
    let executor = fanout_core::executor(Mode::Multiplexed).unwrap();

    let handle = std::thread::spawn(move || {
        executor
            .submit(HttpRequest::get(format!("http://{addr}/ok")))
            .unwrap()
            .code()
    });
    assert_eq!(handle.join().unwrap(), Some(200));
}
