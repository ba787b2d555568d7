//! Request instrumentation middleware.
//!
//! Every request that enters [`HttpMetrics`] walks the same lifecycle:
//!
//! 1. entered: `http_requests_in_progress{method,path}` +1, timer starts
//! 2. dispatched: the inner service runs (the only await point)
//! 3. completed or failed:
//!    - `Ok(response)`: one duration sample, `http_requests_total{..,status_code}` +1
//!    - `Err(e)` or a panic: one duration sample, `http_exceptions_total{..,exception_type}` +1,
//!      `http_requests_total{..,status_code="500"}` +1, then the same error is returned
//!      (or the same panic resumed)
//! 4. exited: `http_requests_in_progress` -1
//!
//! Step 4 lives in `Drop` for [`RequestLifecycle`], so it also runs when the
//! response future is dropped mid-flight. A cancelled request only gets step
//! 4: it is neither timed nor counted.
//!
//! The middleware never changes the response or the error it observes.
//!
//! `exception_type` for an `Err` comes from an [`ErrorKind`] classifier. The
//! default, [`TypeNameKind`], uses the short type name of the error, and for
//! `BoxError` looks through the box at the boxed value.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use futures_util::future::{BoxFuture, FutureExt};
use tower::{BoxError, Layer, Service};

use httpmeter_core::{CounterId, GaugeId, HistogramId, Labels, MetricRegistry};

use crate::config::PathLabel;

/// `exception_type` recorded when the handler panics.
pub const PANIC_KIND: &str = "panic";

/// Status recorded for a request that produced no response.
const FAILED_STATUS: u16 = 500;

/// Names the kind of an error returned by the inner service.
pub trait ErrorKind<E> {
    fn error_kind(&self, err: &E) -> String;
}

impl<E, F> ErrorKind<E> for F
where
    F: Fn(&E) -> String,
{
    fn error_kind(&self, err: &E) -> String {
        self(err)
    }
}

/// Default classifier: short type name of `E`, or of the boxed value when
/// `E` is `BoxError`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeNameKind;

impl<E: 'static> ErrorKind<E> for TypeNameKind {
    fn error_kind(&self, err: &E) -> String {
        match (err as &dyn Any).downcast_ref::<BoxError>() {
            Some(boxed) => boxed_error_kind(boxed),
            None => short_type_name::<E>(),
        }
    }
}

/// Layer that wraps services in [`HttpMetrics`].
#[derive(Clone)]
pub struct HttpMetricsLayer<K = TypeNameKind> {
    registry: Arc<MetricRegistry>,
    path_label: PathLabel,
    error_kind: K,
}

impl HttpMetricsLayer {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            path_label: PathLabel::Raw,
            error_kind: TypeNameKind,
        }
    }
}

impl<K> HttpMetricsLayer<K> {
    /// Choose what goes into the `path` label. Defaults to the raw URL path.
    pub fn path_label(mut self, path_label: PathLabel) -> Self {
        self.path_label = path_label;
        self
    }

    /// Replace the `exception_type` classifier for `Err` results.
    pub fn error_kind<K2>(self, error_kind: K2) -> HttpMetricsLayer<K2> {
        HttpMetricsLayer {
            registry: self.registry,
            path_label: self.path_label,
            error_kind,
        }
    }
}

impl<S, K: Clone> Layer<S> for HttpMetricsLayer<K> {
    type Service = HttpMetrics<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetrics {
            inner,
            registry: Arc::clone(&self.registry),
            path_label: self.path_label,
            error_kind: self.error_kind.clone(),
        }
    }
}

/// Service that records request metrics around `S`.
#[derive(Clone)]
pub struct HttpMetrics<S, K = TypeNameKind> {
    inner: S,
    registry: Arc<MetricRegistry>,
    path_label: PathLabel,
    error_kind: K,
}

impl<S, K, ReqBody, ResBody> Service<Request<ReqBody>> for HttpMetrics<S, K>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    K: ErrorKind<S::Error> + Clone + Send + 'static,
    ResBody: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let labels = route_labels(&req, self.path_label);
        let lifecycle = RequestLifecycle::enter(Arc::clone(&self.registry), labels);

        // A service may panic while building its future, before any polling.
        let future = match panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
            Ok(future) => future,
            Err(payload) => {
                lifecycle.fail(PANIC_KIND);
                panic::resume_unwind(payload);
            }
        };

        let error_kind = self.error_kind.clone();
        Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(response)) => {
                    lifecycle.complete(response.status().as_u16());
                    Ok(response)
                }
                Ok(Err(err)) => {
                    lifecycle.fail(&error_kind.error_kind(&err));
                    Err(err)
                }
                Err(payload) => {
                    lifecycle.fail(PANIC_KIND);
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

/// Per-request record: created on entry, consumed by `complete`/`fail`,
/// and its drop is the exit step.
struct RequestLifecycle {
    registry: Arc<MetricRegistry>,
    labels: Labels,
    start: Instant,
    finished: bool,
}

impl RequestLifecycle {
    fn enter(registry: Arc<MetricRegistry>, labels: Labels) -> Self {
        registry.adjust_gauge(GaugeId::RequestsInProgress, &labels, 1);
        Self {
            registry,
            labels,
            start: Instant::now(),
            finished: false,
        }
    }

    fn observe_elapsed(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        self.registry
            .observe_duration(HistogramId::RequestDuration, &self.labels, elapsed);
    }

    fn complete(mut self, status: u16) {
        self.finished = true;
        self.observe_elapsed();
        self.registry.increment_counter(
            CounterId::RequestsTotal,
            &self.labels.clone().with_status(status),
        );
    }

    fn fail(mut self, kind: &str) {
        self.finished = true;
        self.observe_elapsed();
        self.registry.increment_counter(
            CounterId::ExceptionsTotal,
            &self.labels.clone().with_exception(kind),
        );
        self.registry.increment_counter(
            CounterId::RequestsTotal,
            &self.labels.clone().with_status(FAILED_STATUS),
        );
        tracing::warn!(
            method = self.labels.get(httpmeter_core::labels::METHOD).unwrap_or_default(),
            path = self.labels.get(httpmeter_core::labels::PATH).unwrap_or_default(),
            exception_type = kind,
            "unhandled error in request handler"
        );
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        self.registry
            .adjust_gauge(GaugeId::RequestsInProgress, &self.labels, -1);
        if !self.finished {
            tracing::debug!(
                path = self.labels.get(httpmeter_core::labels::PATH).unwrap_or_default(),
                "request dropped before completion"
            );
        }
    }
}

/// `{method, path}` for a request.
fn route_labels<B>(req: &Request<B>, path_label: PathLabel) -> Labels {
    let raw = req.uri().path();
    let path = match path_label {
        PathLabel::Raw => raw,
        PathLabel::MatchedRoute => req
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or(raw),
    };
    Labels::route(req.method().as_str(), path)
}

/// Short type name: `my_app::errors::ValueError` -> `ValueError`, generics
/// stripped.
pub fn short_type_name<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Kind of a boxed error: the leading identifier of its `Debug` output,
/// which for `#[derive(Debug)]` types is the type name (the variant name for
/// enums). Falls back to `BoxError`.
pub fn boxed_error_kind(err: &BoxError) -> String {
    let debug = format!("{:?}", err);
    let ident: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if ident.is_empty() {
        "BoxError".to_string()
    } else {
        ident
    }
}
