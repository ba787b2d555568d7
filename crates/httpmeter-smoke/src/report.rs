//! Human-readable report and process exit code.

use std::fmt::Write;

use crate::check::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(results: &[CheckResult]) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }
}

pub fn render_report(results: &[CheckResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Smoke Tests Results ===");

    for r in results {
        let verdict = if r.success { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "\n{} - {}", verdict, r.service);
        let _ = writeln!(out, "URL: {}", r.url);
        if let Some(status) = r.status {
            let _ = writeln!(out, "Status Code: {}", status);
        }
        if let Some(err) = &r.error {
            let _ = writeln!(out, "Error: {}", err);
        }
    }

    let s = Summary::of(results);
    let _ = writeln!(out, "\n=== Summary ===");
    let _ = writeln!(out, "Total Services: {}", s.total);
    let _ = writeln!(out, "Successful: {}", s.passed);
    let _ = writeln!(out, "Failed: {}", s.failed);
    out
}

/// 0 when every service passed, 1 otherwise.
pub fn exit_code(results: &[CheckResult]) -> u8 {
    if results.iter().all(|r| r.success) {
        0
    } else {
        1
    }
}
