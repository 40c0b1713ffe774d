//! RPC Adapter: plain DTOs and mapping to/from the coordinator's domain
//! types.
//!
//! The single RPC method (`EvaluateSolution`) is a gRPC service shape in
//! the full system — typed request/response messages, a fixed 8 MiB
//! max-message-size, plaintext transport — but this crate does not depend
//! on `tonic`/`prost` directly. These DTOs are the seam a generated
//! `tonic` service would translate into and out of; the core never sees
//! the wire format.

use uuid::Uuid;

use crate::domain::{Execution, Language, Submission, TestCase};

/// Maximum request/response size in either direction, per spec.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TestCaseDto {
    pub code_version_test_id: String,
    pub input: String,
    pub expected_output: String,
    pub custom_validation_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequestDto {
    pub challenge_id: String,
    pub code_version_id: String,
    pub student_id: String,
    pub code: String,
    pub language: String,
    pub tests: Vec<TestCaseDto>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResponseDto {
    pub approved_tests: Vec<String>,
    pub completed: bool,
    pub execution_time_ms: i64,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub success: bool,
    pub message: String,
    pub error_message: String,
    pub error_type: String,
}

/// The value a `/healthz` surface would serve. The HTTP listener itself is
/// an external collaborator (see §1's scope table); this crate only owns
/// the value such a listener would report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Startup readiness (image builds, DB pool) has completed.
    Serving,
    /// Still running `Registrar::ensure_ready` or connecting the database.
    NotServing,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Serving => "SERVING",
            HealthStatus::NotServing => "NOT_SERVING",
        }
    }
}

/// Errors that prevent the pipeline from even starting, mapped to
/// `InvalidArgument`/`Internal` by the caller.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, AdapterError> {
    if value.trim().is_empty() {
        return Err(AdapterError::InvalidArgument(format!("{field} is required")));
    }
    Uuid::parse_str(value).map_err(|_| AdapterError::InvalidArgument(format!("{field} is not a well-formed UUID")))
}

/// Validates and converts a wire request into the coordinator's
/// [`Submission`] type (spec.md §4.6 step 1).
pub fn to_submission(request: ExecutionRequestDto) -> Result<Submission, AdapterError> {
    let challenge_id = parse_uuid("challengeId", &request.challenge_id)?;
    let code_version_id = parse_uuid("codeVersionId", &request.code_version_id)?;
    let student_id = parse_uuid("studentId", &request.student_id)?;

    if request.tests.is_empty() {
        return Err(AdapterError::InvalidArgument("tests must be nonempty".to_string()));
    }

    let language: Language = request
        .language
        .parse()
        .map_err(|_| AdapterError::InvalidArgument(format!("unsupported language {}", request.language)))?;

    let tests = request
        .tests
        .into_iter()
        .map(|t| {
            Ok(TestCase {
                id: parse_uuid("codeVersionTestId", &t.code_version_test_id)?,
                input: t.input,
                expected_output: t.expected_output,
                custom_validation_code: t.custom_validation_code,
            })
        })
        .collect::<Result<Vec<_>, AdapterError>>()?;

    Ok(Submission {
        challenge_id,
        code_version_id,
        student_id,
        source: request.code,
        language,
        tests,
    })
}

/// Builds the wire response from a completed (or failed-setup)
/// [`Execution`] record (spec.md §4.6 step 10).
pub fn to_response(execution: &Execution) -> ExecutionResponseDto {
    ExecutionResponseDto {
        approved_tests: execution.approved_test_ids.iter().map(Uuid::to_string).collect(),
        completed: true,
        execution_time_ms: execution.execution_time_ms,
        total_tests: execution.total as i32,
        passed_tests: execution.passed as i32,
        failed_tests: execution.failed as i32,
        success: execution.success,
        message: String::new(),
        error_message: execution.error_message.clone().unwrap_or_default(),
        error_type: execution.error_type.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecutionRequestDto {
        ExecutionRequestDto {
            challenge_id: Uuid::new_v4().to_string(),
            code_version_id: Uuid::new_v4().to_string(),
            student_id: Uuid::new_v4().to_string(),
            code: "int add(int n){return n+1;}".to_string(),
            language: "cpp".to_string(),
            tests: vec![TestCaseDto {
                code_version_test_id: Uuid::new_v4().to_string(),
                input: "0".to_string(),
                expected_output: "1".to_string(),
                custom_validation_code: None,
            }],
        }
    }

    #[test]
    fn valid_request_converts_to_submission() {
        assert!(to_submission(request()).is_ok());
    }

    #[test]
    fn empty_challenge_id_is_invalid_argument() {
        let mut req = request();
        req.challenge_id = String::new();
        assert!(matches!(to_submission(req), Err(AdapterError::InvalidArgument(_))));
    }

    #[test]
    fn malformed_uuid_is_invalid_argument() {
        let mut req = request();
        req.student_id = "not-a-uuid".to_string();
        assert!(matches!(to_submission(req), Err(AdapterError::InvalidArgument(_))));
    }

    #[test]
    fn empty_tests_is_invalid_argument() {
        let mut req = request();
        req.tests.clear();
        assert!(matches!(to_submission(req), Err(AdapterError::InvalidArgument(_))));
    }

    #[test]
    fn unsupported_language_is_invalid_argument() {
        let mut req = request();
        req.language = "python".to_string();
        assert!(matches!(to_submission(req), Err(AdapterError::InvalidArgument(_))));
    }
}
