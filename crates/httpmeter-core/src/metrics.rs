//! Request metrics registry.
//!
//! Counter, gauge and histogram families with dynamic labels backed by
//! `DashMap`, so unrelated series never contend on one lock. Counters and
//! gauges are single atomics. A histogram series is several numbers that must
//! be read together, so each series sits behind its own mutex.
//!
//! Series are created on first touch and live as long as the registry.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::labels::Labels;

/// Prometheus client default buckets, in seconds.
pub const DEFAULT_DURATION_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Counters owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterId {
    /// `{method, path, status_code}`
    RequestsTotal,
    /// `{method, path, exception_type}`
    ExceptionsTotal,
}

impl CounterId {
    pub fn name(self) -> &'static str {
        match self {
            CounterId::RequestsTotal => "http_requests_total",
            CounterId::ExceptionsTotal => "http_exceptions_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            CounterId::RequestsTotal => "Total HTTP requests",
            CounterId::ExceptionsTotal => "Total unhandled errors raised by handlers",
        }
    }
}

/// Histograms owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistogramId {
    /// `{method, path}`, seconds.
    RequestDuration,
}

impl HistogramId {
    pub fn name(self) -> &'static str {
        match self {
            HistogramId::RequestDuration => "http_request_duration_seconds",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            HistogramId::RequestDuration => "HTTP request duration in seconds",
        }
    }
}

/// Gauges owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaugeId {
    /// `{method, path}`
    RequestsInProgress,
}

impl GaugeId {
    pub fn name(self) -> &'static str {
        match self {
            GaugeId::RequestsInProgress => "http_requests_in_progress",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            GaugeId::RequestsInProgress => "HTTP requests currently in progress",
        }
    }
}

/// Write the `# HELP` / `# TYPE` preamble.
fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

/// `name{pairs}` or bare `name` when there are no labels.
fn series(name: &str, pairs: &str) -> String {
    if pairs.is_empty() {
        name.to_string()
    } else {
        format!("{}{{{}}}", name, pairs)
    }
}

/// Float formatting for `le` and `_sum`: always carries a decimal point,
/// infinity prints as `+Inf`.
fn fmt_float(v: f64) -> String {
    if v.is_infinite() && v.is_sign_positive() {
        "+Inf".to_string()
    } else {
        format!("{:?}", v)
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Labels, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &Labels) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &Labels, v: u64) {
        if let Some(counter) = self.map.get(labels) {
            counter.fetch_add(v, Ordering::Relaxed);
            return;
        }
        let counter = self
            .map
            .entry(labels.clone())
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &Labels) -> u64 {
        self.map
            .get(labels)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        header(out, name, help, "counter");
        let mut rows: Vec<(Labels, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (labels, val) in rows {
            let _ = writeln!(out, "{} {}", series(name, &labels.render_pairs()), val);
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<Labels, AtomicI64>,
}

impl GaugeVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &Labels) {
        self.add(labels, 1);
    }

    /// Decrement by 1.
    pub fn dec(&self, labels: &Labels) {
        self.add(labels, -1);
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, labels: &Labels, v: i64) {
        if let Some(gauge) = self.map.get(labels) {
            gauge.fetch_add(v, Ordering::Relaxed);
            return;
        }
        let gauge = self
            .map
            .entry(labels.clone())
            .or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &Labels) -> i64 {
        self.map
            .get(labels)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        header(out, name, help, "gauge");
        let mut rows: Vec<(Labels, i64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (labels, val) in rows {
            let _ = writeln!(out, "{} {}", series(name, &labels.render_pairs()), val);
        }
    }
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// `(upper bound, cumulative count)` in ascending order, `+Inf` excluded.
    pub buckets: Vec<(f64, u64)>,
}

struct HistogramState {
    count: u64,
    sum: f64,
    /// Cumulative: slot `i` counts every sample `<= bounds[i]`.
    buckets: Vec<u64>,
}

pub struct HistogramVec {
    bounds: Vec<f64>,
    map: DashMap<Labels, Mutex<HistogramState>>,
}

impl HistogramVec {
    pub fn new(bounds: Vec<f64>) -> Self {
        Self {
            bounds,
            map: DashMap::new(),
        }
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Record one sample and bump every bucket whose bound covers it.
    pub fn observe(&self, labels: &Labels, value: f64) {
        let record = |state: &Mutex<HistogramState>| {
            let mut s = state.lock().unwrap_or_else(PoisonError::into_inner);
            s.count += 1;
            s.sum += value;
            for (i, &le) in self.bounds.iter().enumerate() {
                if value <= le {
                    s.buckets[i] += 1;
                }
            }
        };

        if let Some(state) = self.map.get(labels) {
            record(state.value());
            return;
        }
        let state = self.map.entry(labels.clone()).or_insert_with(|| {
            Mutex::new(HistogramState {
                count: 0,
                sum: 0.0,
                buckets: vec![0; self.bounds.len()],
            })
        });
        record(state.value());
    }

    pub fn snapshot(&self, labels: &Labels) -> Option<HistogramSnapshot> {
        self.map.get(labels).map(|state| self.copy_state(state.value()))
    }

    fn copy_state(&self, state: &Mutex<HistogramState>) -> HistogramSnapshot {
        let s = state.lock().unwrap_or_else(PoisonError::into_inner);
        HistogramSnapshot {
            count: s.count,
            sum: s.sum,
            buckets: self
                .bounds
                .iter()
                .copied()
                .zip(s.buckets.iter().copied())
                .collect(),
        }
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        header(out, name, help, "histogram");
        let mut rows: Vec<(Labels, HistogramSnapshot)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), self.copy_state(r.value())))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        for (labels, snap) in rows {
            let pairs = labels.render_pairs();
            let prefix = if pairs.is_empty() {
                String::new()
            } else {
                format!("{},", pairs)
            };
            for (le, count) in &snap.buckets {
                let _ = writeln!(
                    out,
                    "{}_bucket{{{}le=\"{}\"}} {}",
                    name,
                    prefix,
                    fmt_float(*le),
                    count
                );
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, snap.count);
            let _ = writeln!(
                out,
                "{} {}",
                series(&format!("{}_sum", name), &pairs),
                fmt_float(snap.sum)
            );
            let _ = writeln!(
                out,
                "{} {}",
                series(&format!("{}_count", name), &pairs),
                snap.count
            );
        }
    }
}

/// The four request instruments.
///
/// Build one at startup and share it as `Arc<MetricRegistry>` between the
/// middleware and the scrape handler. There is no reset: state lives until the
/// registry is dropped.
pub struct MetricRegistry {
    requests_total: CounterVec,
    exceptions_total: CounterVec,
    request_duration: HistogramVec,
    requests_in_progress: GaugeVec,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::with_buckets(DEFAULT_DURATION_BUCKETS.to_vec())
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose duration histogram uses `buckets` (seconds). Non-finite
    /// bounds are dropped; the rest are sorted and deduplicated.
    pub fn with_buckets(mut buckets: Vec<f64>) -> Self {
        buckets.retain(|b| b.is_finite());
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        Self {
            requests_total: CounterVec::default(),
            exceptions_total: CounterVec::default(),
            request_duration: HistogramVec::new(buckets),
            requests_in_progress: GaugeVec::default(),
        }
    }

    fn counter(&self, id: CounterId) -> &CounterVec {
        match id {
            CounterId::RequestsTotal => &self.requests_total,
            CounterId::ExceptionsTotal => &self.exceptions_total,
        }
    }

    fn histogram(&self, id: HistogramId) -> &HistogramVec {
        match id {
            HistogramId::RequestDuration => &self.request_duration,
        }
    }

    fn gauge(&self, id: GaugeId) -> &GaugeVec {
        match id {
            GaugeId::RequestsInProgress => &self.requests_in_progress,
        }
    }

    /// +1 on the counter series for `labels`.
    pub fn increment_counter(&self, id: CounterId, labels: &Labels) {
        self.counter(id).inc(labels);
    }

    /// Record one duration sample, in seconds.
    pub fn observe_duration(&self, id: HistogramId, labels: &Labels, seconds: f64) {
        debug_assert!(seconds >= 0.0, "negative duration observed: {seconds}");
        self.histogram(id).observe(labels, seconds);
    }

    /// Add a signed delta to the gauge series for `labels`.
    pub fn adjust_gauge(&self, id: GaugeId, labels: &Labels, delta: i64) {
        self.gauge(id).add(labels, delta);
    }

    pub fn counter_value(&self, id: CounterId, labels: &Labels) -> u64 {
        self.counter(id).get(labels)
    }

    pub fn gauge_value(&self, id: GaugeId, labels: &Labels) -> i64 {
        self.gauge(id).get(labels)
    }

    pub fn histogram_snapshot(&self, id: HistogramId, labels: &Labels) -> Option<HistogramSnapshot> {
        self.histogram(id).snapshot(labels)
    }

    pub fn duration_buckets(&self) -> &[f64] {
        self.request_duration.bounds()
    }

    /// Render every instrument in Prometheus text exposition format (0.0.4).
    pub fn render(&self) -> String {
        let mut out = String::new();

        let c = CounterId::RequestsTotal;
        self.requests_total.render(c.name(), c.help(), &mut out);

        let h = HistogramId::RequestDuration;
        self.request_duration.render(h.name(), h.help(), &mut out);

        let g = GaugeId::RequestsInProgress;
        self.requests_in_progress.render(g.name(), g.help(), &mut out);

        let c = CounterId::ExceptionsTotal;
        self.exceptions_total.render(c.name(), c.help(), &mut out);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(fmt_float(0.005), "0.005");
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(f64::INFINITY), "+Inf");
    }

    #[test]
    fn bucket_list_is_normalized() {
        let reg = MetricRegistry::with_buckets(vec![1.0, f64::NAN, 0.5, 1.0]);
        assert_eq!(reg.duration_buckets(), &[0.5, 1.0]);
    }
}
