//! Test results and the end-of-run tally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "✅" } else { "❌" };
        if self.detail.is_empty() {
            write!(f, "{} {}", mark, self.name)
        } else {
            write!(f, "{} {}: {}", mark, self.name, self.detail)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub total: usize,
    /// Every recorded result passed
    pub success: bool,
}

impl Summary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();
        Self {
            passed,
            total,
            success: passed == total,
        }
    }

    /// Percentage of passing results, 0.0 when nothing ran
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.success {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} passed ({:.1}%)",
            self.passed,
            self.total,
            self.success_rate()
        )
    }
}

/// Ordered results of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    results: Vec<TestResult>,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        self.results.push(TestResult {
            name: name.into(),
            passed,
            detail: detail.into(),
            recorded_at: Utc::now(),
        });
    }

    pub fn pass(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, true, detail);
    }

    pub fn fail(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, false, detail);
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn summary(&self) -> Summary {
        Summary::from_results(&self.results)
    }

    /// Stamp the finish time and return the tally
    pub fn finish(&mut self) -> Summary {
        self.finished_at.get_or_insert_with(Utc::now);
        self.summary()
    }

    /// One line per result followed by the tally
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&result.to_string());
            out.push('\n');
        }
        out.push_str(&format!("\nResults: {}\n", self.summary()));
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Output<'a> {
            #[serde(flatten)]
            report: &'a Report,
            summary: Summary,
        }

        serde_json::to_string_pretty(&Output {
            report: self,
            summary: self.summary(),
        })
    }
}
