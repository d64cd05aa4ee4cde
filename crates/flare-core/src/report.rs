//! Plain-text rendering of scenario results and job reports

use crate::jobs::ValidationReport;
use crate::scenarios::{
    ColdStartResult, FireworksResult, FullValidationResult, MassiveQueryResult, ScenarioResult,
    VersioningResult,
};

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

fn check(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAILED"
    }
}

impl MassiveQueryResult {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Massive Query ===\n\n");
        report.push_str(&format!("Dataset: {} v{}\n", self.dataset, self.version));
        report.push_str(&format!("Partitions: {}\n", self.partitions));
        report.push_str(&format!("Records: {}\n", self.total_records));
        report.push_str(&format!(
            "Queries: {}/{} completed, {} failed\n",
            self.queries_completed, self.queries_requested, self.queries_failed
        ));
        report.push_str(&format!(
            "Latency p50/p95/p99: {:.1}/{:.1}/{:.1} ms (target p99 < {:.1} ms)\n",
            self.latency.p50_ms, self.latency.p95_ms, self.latency.p99_ms, self.p99_target_ms
        ));
        report.push_str(&format!("Mean Provisioning: {:.1} ms\n", self.mean_provisioning_ms));
        if let Some(e) = &self.first_error {
            report.push_str(&format!("First Error: {e}\n"));
        }
        if self.cancelled {
            report.push_str("Run was cancelled\n");
        }
        report.push_str(&format!("\n=== Result: {} ===\n", verdict(self.passed)));
        report
    }
}

impl ColdStartResult {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Cold Start Validation ===\n\n");
        report.push_str(&format!(
            "Samples: {} ({})\n",
            self.samples,
            if self.from_source { "source units" } else { "synthetic corpus" }
        ));
        report.push_str("Candidates:\n");
        for score in &self.training.scores {
            report.push_str(&format!(
                "  {:<16} R² {:.3}  MAE {:.1}  RMSE {:.1}  CV-RMSE {:.1}\n",
                score.name, score.r2, score.mae, score.rmse, score.cv_rmse
            ));
        }
        report.push_str(&format!(
            "Selected: {} (R² {:.3}, threshold {:.2})\n",
            self.training.best_model, self.best_r2, self.r2_threshold
        ));
        if !self.top_slow.is_empty() {
            report.push_str("\nSlowest Functions:\n");
            for slow in &self.top_slow {
                report.push_str(&format!(
                    "  {} ({:.0} ms, ~{:.0} ms recoverable)\n",
                    slow.name, slow.predicted_ms, slow.estimated_improvement_ms
                ));
                for suggestion in &slow.optimization_suggestions {
                    report.push_str(&format!("    - {suggestion}\n"));
                }
            }
        }
        report.push_str(&format!("\n=== Result: {} ===\n", verdict(self.passed)));
        report
    }
}

impl FireworksResult {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = self.report.generate_text();
        report.push_str(&format!(
            "Cold Starts: {:?}, throttle limit {}\n",
            self.cold_start_source, self.throttle_limit
        ));
        report.push_str(&format!("=== Storm: {} ===\n", verdict(self.passed)));
        report
    }
}

impl VersioningResult {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Immutability Versioning ===\n\n");
        report.push_str(&format!(
            "Dataset: {} (v{} -> v{}, rolled back to v{}, {} partitions)\n",
            self.dataset, self.original_version, self.modified_version, self.rolled_back_to, self.partitions
        ));
        report.push_str(&format!("Modifications Applied: {}\n", check(self.modifications_applied)));
        report.push_str(&format!("Pointer Rolled Back: {}\n", check(self.pointer_reflects_rollback)));
        report.push_str(&format!("Original Data Intact: {}\n", check(self.original_data_intact)));
        report.push_str(&format!("Checksums Match: {}\n", check(self.checksums_match)));
        report.push_str(&format!("\n=== Result: {} ===\n", verdict(self.passed)));
        report
    }
}

impl FullValidationResult {
    /// Summary table followed by each scenario's report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Full Validation ===\n\n");
        for entry in &self.tests {
            report.push_str(&format!(
                "  {:<26} {}  {:>10.1} ms",
                entry.test_type.as_str(),
                verdict(entry.passed),
                entry.duration_ms
            ));
            if let Some(e) = &entry.error {
                report.push_str(&format!("  ({e})"));
            }
            report.push('\n');
        }
        report.push_str(&format!(
            "\nPassed: {}/{} ({:.0}%)\n",
            self.tests_passed,
            self.tests_total,
            self.success_rate * 100.0
        ));
        for result in self.tests.iter().filter_map(|e| e.result.as_deref()) {
            report.push('\n');
            report.push_str(&result.generate_text());
        }
        report.push_str(&format!("\n=== Overall: {} ===\n", verdict(self.all_passed)));
        report
    }
}

impl ScenarioResult {
    /// Human-readable summary of whichever scenario ran
    #[must_use]
    pub fn generate_text(&self) -> String {
        match self {
            Self::MassiveQuery(r) => r.generate_text(),
            Self::ColdStartValidation(r) => r.generate_text(),
            Self::FireworksStorm(r) => r.generate_text(),
            Self::ImmutabilityVersioning(r) => r.generate_text(),
            Self::FullValidation(r) => r.generate_text(),
        }
    }
}

impl ValidationReport {
    /// Job header plus the scenario report, if any
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("Job {} ({}): {:?}\n", self.test_id, self.test_type, self.status));
        if let Some(e) = &self.error {
            report.push_str(&format!("Error: {e}\n"));
        }
        if let Some(result) = &self.result {
            report.push('\n');
            report.push_str(&result.generate_text());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{ScenarioEntry, TestKind};

    fn versioning(passed: bool) -> VersioningResult {
        VersioningResult {
            dataset: "orders".into(),
            original_version: 1,
            modified_version: 2,
            rolled_back_to: 1,
            partitions: 4,
            pointer_reflects_rollback: true,
            original_data_intact: passed,
            checksums_match: true,
            modifications_applied: true,
            passed,
        }
    }

    #[test]
    fn test_versioning_text() {
        let text = versioning(false).generate_text();
        assert!(text.contains("v1 -> v2"));
        assert!(text.contains("Original Data Intact: FAILED"));
        assert!(text.contains("=== Result: FAIL ==="));
    }

    #[test]
    fn test_full_validation_text_lists_errors() {
        let full = FullValidationResult::from_entries(vec![
            ScenarioEntry {
                test_type: TestKind::ImmutabilityVersioning,
                passed: true,
                result: Some(Box::new(ScenarioResult::ImmutabilityVersioning(versioning(true)))),
                error: None,
                duration_ms: 12.0,
            },
            ScenarioEntry {
                test_type: TestKind::FireworksStorm,
                passed: false,
                result: None,
                error: Some("operation cancelled".into()),
                duration_ms: 0.0,
            },
        ]);
        let text = full.generate_text();
        assert!(text.contains("Passed: 1/2 (50%)"));
        assert!(text.contains("(operation cancelled)"));
        assert!(text.contains("=== Immutability Versioning ==="));
        assert!(text.contains("=== Overall: FAIL ==="));
    }
}
