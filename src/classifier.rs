//! Error Classifier: maps non-zero exit code + stderr to the fixed failure
//! taxonomy. Applied only when the parser did not run or did not detect a
//! framework summary.

/// One of the fixed taxonomy kinds, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    LinkingError,
    TypeError,
    RedeclarationError,
    CompilationError,
    RuntimeError,
    TestFailure,
    ExecutionError,
}

impl ErrorKind {
    /// Wire/persistence representation, matching spec.md's taxonomy names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::LinkingError => "linking_error",
            ErrorKind::TypeError => "type_error",
            ErrorKind::RedeclarationError => "redeclaration_error",
            ErrorKind::CompilationError => "compilation_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::TestFailure => "test_failure",
            ErrorKind::ExecutionError => "execution_error",
        }
    }

    /// Compile-class kinds zero out the execution counts.
    pub fn is_compile_class(&self) -> bool {
        matches!(
            self,
            ErrorKind::SyntaxError
                | ErrorKind::LinkingError
                | ErrorKind::TypeError
                | ErrorKind::RedeclarationError
                | ErrorKind::CompilationError
        )
    }
}

const RUNTIME_SIGNALS: &[&str] = &[
    "Segmentation fault",
    "core dumped",
    "Floating point exception",
    "Aborted",
    "abort",
];

/// Classifies a failed run from its exit code and stderr, in the ordered
/// precedence the taxonomy requires.
pub fn classify(exit_code: Option<i32>, stderr: &str, parsed_failed: usize) -> (ErrorKind, String) {
    for line in stderr.lines() {
        if line.contains("error:") && (line.contains("expected") || line.contains("syntax error")) {
            return (ErrorKind::SyntaxError, line.to_string());
        }
    }
    if let Some(line) = stderr.lines().find(|l| l.contains("undefined reference")) {
        return (ErrorKind::LinkingError, line.to_string());
    }
    if let Some(line) = stderr
        .lines()
        .find(|l| l.contains("no matching function") || l.contains("cannot convert"))
    {
        return (ErrorKind::TypeError, line.to_string());
    }
    if let Some(line) = stderr
        .lines()
        .find(|l| l.contains("redeclared") || l.contains("redefinition"))
    {
        return (ErrorKind::RedeclarationError, line.to_string());
    }
    if let Some(line) = stderr
        .lines()
        .find(|l| l.contains("error:") || l.contains("fatal error:"))
    {
        return (ErrorKind::CompilationError, line.to_string());
    }
    for signal in RUNTIME_SIGNALS {
        if stderr.contains(signal) {
            return (ErrorKind::RuntimeError, format!("Runtime error: {signal}"));
        }
    }
    if exit_code.map(|c| c != 0).unwrap_or(false) && parsed_failed > 0 {
        return (ErrorKind::TestFailure, "Some tests failed".to_string());
    }
    (ErrorKind::ExecutionError, "Execution failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_takes_precedence_over_generic_compile_error() {
        let stderr = "solution.cpp:3:20: error: expected ';' before '}' token\n";
        let (kind, msg) = classify(Some(1), stderr, 0);
        assert_eq!(kind, ErrorKind::SyntaxError);
        assert!(msg.contains("expected"));
    }

    #[test]
    fn linking_error_is_detected() {
        let stderr = "/usr/bin/ld: undefined reference to `foo()'\n";
        let (kind, _) = classify(Some(1), stderr, 0);
        assert_eq!(kind, ErrorKind::LinkingError);
    }

    #[test]
    fn redeclaration_before_generic_compile_error() {
        let stderr = "solution.cpp:5:5: error: redefinition of 'int add(int)'\n";
        let (kind, _) = classify(Some(1), stderr, 0);
        assert_eq!(kind, ErrorKind::RedeclarationError);
    }

    #[test]
    fn segfault_is_runtime_error() {
        let (kind, msg) = classify(Some(139), "Segmentation fault (core dumped)\n", 0);
        assert_eq!(kind, ErrorKind::RuntimeError);
        assert!(msg.contains("Segmentation fault"));
    }

    #[test]
    fn nonzero_exit_with_failures_and_no_stderr_match_is_test_failure() {
        let (kind, _) = classify(Some(1), "", 1);
        assert_eq!(kind, ErrorKind::TestFailure);
    }

    #[test]
    fn unrecognized_failure_falls_back_to_execution_error() {
        let (kind, _) = classify(Some(1), "", 0);
        assert_eq!(kind, ErrorKind::ExecutionError);
    }

    #[test]
    fn compile_class_kinds_zero_counts() {
        assert!(ErrorKind::SyntaxError.is_compile_class());
        assert!(!ErrorKind::RuntimeError.is_compile_class());
        assert!(!ErrorKind::TestFailure.is_compile_class());
    }
}
