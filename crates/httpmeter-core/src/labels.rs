//! Label tuples: the named dimensions that identify one series.

use std::fmt::Write;

pub const METHOD: &str = "method";
pub const PATH: &str = "path";
pub const STATUS_CODE: &str = "status_code";
pub const EXCEPTION_TYPE: &str = "exception_type";

/// Ordered `(name, value)` pairs. Order is insertion order and is kept when
/// rendering, so `{method, path, status_code}` always prints in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<(&'static str, String)>);

impl Labels {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// `{method, path}`: the key of the in-flight gauge and duration histogram.
    pub fn route(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new().with(METHOD, method).with(PATH, path)
    }

    /// Append one dimension.
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.push((name, value.into()));
        self
    }

    /// `{method, path}` + `status_code`.
    pub fn with_status(self, status: u16) -> Self {
        self.with(STATUS_CODE, status.to_string())
    }

    /// `{method, path}` + `exception_type`.
    pub fn with_exception(self, kind: impl Into<String>) -> Self {
        self.with(EXCEPTION_TYPE, kind)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// `k1="v1",k2="v2"` with exposition-format escaping; empty when there
    /// are no labels.
    pub(crate) fn render_pairs(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}=\"{}\"", k, escape_label(v));
        }
        out
    }
}

/// Escape a label value for the text exposition format.
pub(crate) fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
