//! Plain-text rendering of batch summaries for terminal output.

use super::summary::BatchSummary;
use crate::scheduler::Verdict;

/// Renders a summary as a human-readable text block.
///
/// One header section with aggregate numbers, then one line per task
/// in task-id order.
pub fn render_text(summary: &BatchSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Batch {} on {} ({} tasks)\n",
        summary.run_id, summary.dataset, summary.total
    ));
    out.push_str(&format!(
        "Resolved: {}/{} ({:.1}%)\n",
        summary.resolved, summary.total, summary.resolution_pct
    ));

    if !summary.failures.is_empty() {
        let histogram: Vec<String> = summary
            .failures
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        out.push_str(&format!("Failures: {}\n", histogram.join(", ")));
    }

    out.push_str(&format!(
        "Runtime: min {}ms, avg {:.1}ms, max {}ms\n",
        summary.runtime.min_ms, summary.runtime.avg_ms, summary.runtime.max_ms
    ));
    out.push('\n');

    for record in &summary.records {
        match record.verdict {
            Verdict::Pass => out.push_str(&format!(
                "  [PASS] {} ({}/{} tests, {}ms)\n",
                record.task_id, record.tests_passed, record.total_tests, record.runtime_ms
            )),
            Verdict::Fail => {
                let kind = record
                    .failure_type
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                out.push_str(&format!(
                    "  [FAIL] {} ({}/{} tests, {}, {}ms)\n",
                    record.task_id, record.tests_passed, record.total_tests, kind, record.runtime_ms
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::FailureKind;
    use crate::report::summary::{RuntimeStats, TaskRecord};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn demo_summary() -> BatchSummary {
        let mut failures = BTreeMap::new();
        failures.insert(FailureKind::ApplyError, 1);

        BatchSummary {
            run_id: Uuid::nil(),
            dataset: crate::catalog::Dataset::Lite,
            started_at: Utc::now(),
            total_runtime_ms: 2100,
            total: 2,
            resolved: 1,
            resolution_pct: 50.0,
            failures,
            runtime: RuntimeStats {
                min_ms: 40,
                max_ms: 1500,
                avg_ms: 770.0,
            },
            records: vec![
                TaskRecord {
                    task_id: "t-1".to_string(),
                    verdict: Verdict::Fail,
                    tests_passed: 0,
                    total_tests: 2,
                    failure_type: Some(FailureKind::ApplyError),
                    runtime_ms: 40,
                    logs_uri: None,
                },
                TaskRecord {
                    task_id: "t-2".to_string(),
                    verdict: Verdict::Pass,
                    tests_passed: 2,
                    total_tests: 2,
                    failure_type: None,
                    runtime_ms: 1500,
                    logs_uri: Some("artifacts/logs/t-2-agent.log".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_render_text_header() {
        let text = render_text(&demo_summary());
        assert!(text.contains("Resolved: 1/2 (50.0%)"));
        assert!(text.contains("Failures: apply_error=1"));
        assert!(text.contains("Runtime: min 40ms, avg 770.0ms, max 1500ms"));
    }

    #[test]
    fn test_render_text_records() {
        let text = render_text(&demo_summary());
        assert!(text.contains("  [FAIL] t-1 (0/2 tests, apply_error, 40ms)"));
        assert!(text.contains("  [PASS] t-2 (2/2 tests, 1500ms)"));
    }

    #[test]
    fn test_render_text_omits_empty_histogram() {
        let mut summary = demo_summary();
        summary.failures.clear();
        let text = render_text(&summary);
        assert!(!text.contains("Failures:"));
    }
}
