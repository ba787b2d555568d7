//! Request lifecycle accounting of `HttpMetrics` around plain tower services.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tower::{service_fn, BoxError, Layer, Service, ServiceExt};

use httpmeter_core::{CounterId, GaugeId, HistogramId, Labels, MetricRegistry};
use httpmeter_gateway::obs::HttpMetricsLayer;
use httpmeter_gateway::obs::middleware::PANIC_KIND;

#[derive(Debug, PartialEq)]
struct ValueError(&'static str);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for ValueError {}

fn get(path: &str) -> Request<()> {
    Request::builder().method("GET").uri(path).body(()).unwrap()
}

fn respond(status: StatusCode) -> Response<()> {
    Response::builder().status(status).body(()).unwrap()
}

fn in_flight(reg: &MetricRegistry, path: &str) -> i64 {
    reg.gauge_value(GaugeId::RequestsInProgress, &Labels::route("GET", path))
}

fn requests(reg: &MetricRegistry, path: &str, status: u16) -> u64 {
    reg.counter_value(
        CounterId::RequestsTotal,
        &Labels::route("GET", path).with_status(status),
    )
}

fn exceptions(reg: &MetricRegistry, path: &str, kind: &str) -> u64 {
    reg.counter_value(
        CounterId::ExceptionsTotal,
        &Labels::route("GET", path).with_exception(kind),
    )
}

fn samples(reg: &MetricRegistry, path: &str) -> u64 {
    reg.histogram_snapshot(HistogramId::RequestDuration, &Labels::route("GET", path))
        .map(|s| s.count)
        .unwrap_or(0)
}

#[tokio::test]
async fn health_ok_counts_once() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        tokio::time::sleep(Duration::from_millis(12)).await;
        Ok::<_, Infallible>(respond(StatusCode::OK))
    }));

    let resp = svc.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(requests(&reg, "/health", 200), 1);
    assert_eq!(exceptions(&reg, "/health", "Infallible"), 0);
    assert_eq!(in_flight(&reg, "/health"), 0);

    let snap = reg
        .histogram_snapshot(HistogramId::RequestDuration, &Labels::route("GET", "/health"))
        .unwrap();
    assert_eq!(snap.count, 1);
    assert!(snap.sum >= 0.012, "sum was {}", snap.sum);
    assert!(snap.sum < 5.0, "sum was {}", snap.sum);
}

#[tokio::test]
async fn handled_error_status_is_not_an_exception() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        Ok::<_, ValueError>(respond(StatusCode::NOT_FOUND))
    }));

    let resp = svc.oneshot(get("/missing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    assert_eq!(requests(&reg, "/missing", 404), 1);
    assert_eq!(requests(&reg, "/missing", 500), 0);
    assert_eq!(exceptions(&reg, "/missing", "ValueError"), 0);
    assert_eq!(samples(&reg, "/missing"), 1);
    assert_eq!(in_flight(&reg, "/missing"), 0);
}

#[tokio::test]
async fn service_error_is_counted_and_passed_through() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        Err::<Response<()>, _>(ValueError("bad value"))
    }));

    let err = svc.oneshot(get("/broken")).await.unwrap_err();
    assert_eq!(err, ValueError("bad value"));

    assert_eq!(exceptions(&reg, "/broken", "ValueError"), 1);
    assert_eq!(requests(&reg, "/broken", 500), 1);
    assert_eq!(samples(&reg, "/broken"), 1);
    assert_eq!(in_flight(&reg, "/broken"), 0);
}

#[tokio::test]
async fn boxed_error_is_labelled_with_the_boxed_type() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        Err::<Response<()>, BoxError>(Box::new(ValueError("bad value")))
    }));

    let err = svc.oneshot(get("/broken")).await.unwrap_err();
    assert_eq!(err.downcast_ref::<ValueError>(), Some(&ValueError("bad value")));

    assert_eq!(exceptions(&reg, "/broken", "ValueError"), 1);
    assert_eq!(exceptions(&reg, "/broken", "Box"), 0);
    assert_eq!(requests(&reg, "/broken", 500), 1);
    assert!(reg.render().contains(
        "http_exceptions_total{method=\"GET\",path=\"/broken\",exception_type=\"ValueError\"} 1\n"
    ));
}

#[tokio::test]
async fn custom_error_kind_classifier() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone())
        .error_kind(|err: &ValueError| format!("ValueError:{}", err.0))
        .layer(service_fn(|_req: Request<()>| async {
            Err::<Response<()>, _>(ValueError("empty"))
        }));

    let _ = svc.oneshot(get("/broken")).await.unwrap_err();

    assert_eq!(exceptions(&reg, "/broken", "ValueError:empty"), 1);
    assert_eq!(exceptions(&reg, "/broken", "ValueError"), 0);
    assert_eq!(in_flight(&reg, "/broken"), 0);
}

#[tokio::test]
async fn panic_while_polling_is_counted_and_resumed() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        if true {
            panic!("boom");
        }
        Ok::<_, Infallible>(respond(StatusCode::OK))
    }));

    let join = tokio::spawn(svc.oneshot(get("/explode"))).await;
    let err = join.expect_err("panic must propagate");
    assert!(err.is_panic());
    let payload = err.into_panic();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    assert_eq!(exceptions(&reg, "/explode", PANIC_KIND), 1);
    assert_eq!(requests(&reg, "/explode", 500), 1);
    assert_eq!(samples(&reg, "/explode"), 1);
    assert_eq!(in_flight(&reg, "/explode"), 0);
}

/// Panics while building its future, before anything is polled.
#[derive(Clone)]
struct PanicsInCall;

impl Service<Request<()>> for PanicsInCall {
    type Response = Response<()>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<()>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<()>) -> Self::Future {
        panic!("refused");
    }
}

#[test]
fn panic_in_call_is_counted_and_resumed() {
    let reg = Arc::new(MetricRegistry::new());
    let mut svc = HttpMetricsLayer::new(reg.clone()).layer(PanicsInCall);

    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = svc.call(get("/eager"));
    }));
    let payload = caught.expect_err("panic must propagate");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"refused"));

    assert_eq!(exceptions(&reg, "/eager", PANIC_KIND), 1);
    assert_eq!(requests(&reg, "/eager", 500), 1);
    assert_eq!(in_flight(&reg, "/eager"), 0);
}

#[tokio::test]
async fn gauge_tracks_requests_in_flight() {
    let reg = Arc::new(MetricRegistry::new());
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(move |_req: Request<()>| {
        let release_rx = release_rx.clone();
        async move {
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            Ok::<_, Infallible>(respond(StatusCode::OK))
        }
    }));

    let task = tokio::spawn(svc.oneshot(get("/slow")));

    // wait until the handler is parked
    for _ in 0..100 {
        if in_flight(&reg, "/slow") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(in_flight(&reg, "/slow"), 1);
    assert_eq!(requests(&reg, "/slow", 200), 0);

    release_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(in_flight(&reg, "/slow"), 0);
    assert_eq!(requests(&reg, "/slow", 200), 1);
}

#[tokio::test]
async fn cancelled_request_only_releases_gauge() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        std::future::pending::<()>().await;
        Ok::<_, Infallible>(respond(StatusCode::OK))
    }));

    let res = tokio::time::timeout(Duration::from_millis(20), svc.oneshot(get("/hang"))).await;
    assert!(res.is_err(), "handler never completes");

    assert_eq!(in_flight(&reg, "/hang"), 0);
    assert_eq!(requests(&reg, "/hang", 200), 0);
    assert_eq!(requests(&reg, "/hang", 500), 0);
    assert_eq!(samples(&reg, "/hang"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_all_counted() {
    const N: usize = 64;
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        tokio::task::yield_now().await;
        Ok::<_, Infallible>(respond(StatusCode::OK))
    }));

    let tasks: Vec<_> = (0..N)
        .map(|_| tokio::spawn(svc.clone().oneshot(get("/items"))))
        .collect();
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    assert_eq!(requests(&reg, "/items", 200), N as u64);
    assert_eq!(samples(&reg, "/items"), N as u64);
    assert_eq!(in_flight(&reg, "/items"), 0);
}

#[tokio::test]
async fn methods_are_separate_series() {
    let reg = Arc::new(MetricRegistry::new());
    let svc = HttpMetricsLayer::new(reg.clone()).layer(service_fn(|_req: Request<()>| async {
        Ok::<_, Infallible>(respond(StatusCode::CREATED))
    }));

    let post = Request::builder().method("POST").uri("/items").body(()).unwrap();
    svc.clone().oneshot(post).await.unwrap();
    svc.oneshot(get("/items")).await.unwrap();

    let post_labels = Labels::route("POST", "/items").with_status(201);
    assert_eq!(reg.counter_value(CounterId::RequestsTotal, &post_labels), 1);
    assert_eq!(requests(&reg, "/items", 201), 1);
}
