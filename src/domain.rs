//! Core data model shared across the evaluation pipeline.
//!
//! These types carry no behavior beyond small invariant-preserving
//! constructors; the pipeline stages in [`crate::templater`],
//! [`crate::sandbox`], [`crate::parser`], [`crate::classifier`], and
//! [`crate::coordinator`] operate on them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A language the core can compile and run.
///
/// Only `Cpp` is implemented today; the wire accepts any string and the
/// coordinator resolves it through a [`LanguageRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Cpp,
}

impl Language {
    /// File extension used for the generated harness source.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
        }
    }

    /// Canonical wire/tag representation, e.g. `coderunner-cpp:latest`.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpp" => Ok(Language::Cpp),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Returned when a submission names a language the core doesn't support.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

/// A single test case embedded in a submission.
///
/// The `id` is a stable UUID string that must appear verbatim in the
/// generated harness and in the response's approved-test list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub input: String,
    pub expected_output: String,
    pub custom_validation_code: Option<String>,
}

/// Input to the evaluation core, constructed once by the RPC adapter and
/// never mutated afterward.
#[derive(Debug, Clone)]
pub struct Submission {
    pub challenge_id: Uuid,
    pub code_version_id: Uuid,
    pub student_id: Uuid,
    pub source: String,
    pub language: Language,
    pub tests: Vec<TestCase>,
}

impl Submission {
    /// Returns the test identifiers in submission order.
    pub fn test_ids(&self) -> Vec<Uuid> {
        self.tests.iter().map(|t| t.id).collect()
    }
}

/// A generated, compiled-as-is harness, persisted before execution so the
/// exact bytes that were compiled can be replayed.
#[derive(Debug, Clone)]
pub struct GeneratedHarness {
    pub execution_id: Uuid,
    pub source: String,
    pub byte_size: usize,
    pub test_case_count: usize,
    pub generation_duration: Duration,
}

impl GeneratedHarness {
    pub fn new(execution_id: Uuid, source: String, test_case_count: usize, generation_duration: Duration) -> Self {
        Self {
            execution_id,
            byte_size: source.len(),
            source,
            test_case_count,
            generation_duration,
        }
    }
}

/// Lifecycle status of an [`Execution`] audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// The audit record persisted for every evaluation.
///
/// Created with `Running` before harness generation, updated exactly once
/// after the sandbox run completes (or the pipeline fails setup), never
/// deleted by the core.
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub code_version_id: Uuid,
    pub student_id: Uuid,
    pub language: Language,
    pub source: String,
    pub status: ExecutionStatus,
    pub success: bool,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub approved_test_ids: Vec<Uuid>,
    pub failed_test_ids: Vec<Uuid>,
    pub execution_time_ms: i64,
    pub memory_mb: Option<i64>,
    pub exit_code: Option<i32>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Creates the initial `Running` record for a submission.
    pub fn start(submission: &Submission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            challenge_id: submission.challenge_id,
            code_version_id: submission.code_version_id,
            student_id: submission.student_id,
            language: submission.language,
            source: submission.source.clone(),
            status: ExecutionStatus::Running,
            success: false,
            total: submission.tests.len(),
            passed: 0,
            failed: 0,
            approved_test_ids: Vec::new(),
            failed_test_ids: Vec::new(),
            execution_time_ms: 0,
            memory_mb: None,
            exit_code: None,
            error_type: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-test pass/fail verdict produced by the [`crate::parser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVerdict {
    pub test_id: Uuid,
    pub passed: bool,
    pub message: Option<String>,
}

/// In-memory-only result of running the sandbox, discarded after the
/// coordinator builds its response.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub verdicts: Vec<TestVerdict>,
}

impl ExecutionResult {
    /// `true` iff exit code is 0, parsed `failed == 0`, and `total > 0`.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.failed == 0 && self.total > 0
    }

    /// Test ids whose verdict is a pass, in verdict order.
    pub fn approved_ids(&self) -> Vec<Uuid> {
        self.verdicts
            .iter()
            .filter(|v| v.passed)
            .map(|v| v.test_id)
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.verdicts
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.test_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_through_tag() {
        assert_eq!(Language::Cpp.tag().parse::<Language>().unwrap(), Language::Cpp);
    }

    #[test]
    fn unknown_language_is_rejected() {
        assert!("python".parse::<Language>().is_err());
    }

    #[test]
    fn execution_result_success_requires_nonzero_total() {
        let result = ExecutionResult {
            exit_code: Some(0),
            failed: 0,
            total: 0,
            ..Default::default()
        };
        assert!(!result.success());
    }

    #[test]
    fn execution_result_success_requires_zero_exit_and_no_failures() {
        let result = ExecutionResult {
            exit_code: Some(0),
            failed: 0,
            total: 2,
            ..Default::default()
        };
        assert!(result.success());
    }
}
