//! Harness Templater: splices student source and per-test assertions into
//! a compilable doctest C++ harness.

use std::time::Instant;

use regex::Regex;

use crate::domain::{GeneratedHarness, Submission, TestCase};

pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("cannot infer function name")]
    FunctionNameNotFound,
    #[error("no template available for language {0}")]
    UnsupportedLanguage(String),
}

const CPP_TEMPLATE: &str = r#"#define DOCTEST_CONFIG_IMPLEMENT_WITH_MAIN
#include "doctest.h"

// __SOLUTION__

// __TESTS__
"#;

/// Matches the first top-level function declaration of the form
/// `<return-type> <identifier>(`.
fn function_name_regex() -> Regex {
    Regex::new(r"(?m)^\s*(?:int|void|double|float|char|string|bool)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("static regex is valid")
}

/// Extracts the function to invoke from the student's source.
fn infer_function_name(source: &str) -> TemplateResult<String> {
    function_name_regex()
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(TemplateError::FunctionNameNotFound)
}

/// Renders a literal as an integer when parseable, otherwise as a quoted
/// C++ string literal.
fn render_literal(value: &str) -> String {
    if let Ok(n) = value.trim().parse::<i64>() {
        n.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn render_test_case(function: &str, test: &TestCase) -> String {
    format!(
        "TEST_CASE(\"{id}\") {{ CHECK({fn}({input}) == {expected}); }}",
        id = test.id,
        fn = function,
        input = render_literal(&test.input),
        expected = render_literal(&test.expected_output),
    )
}

/// Generates the harness source for a submission and the metadata the
/// caller needs to persist it, stamped with the owning execution's id so
/// the persisted row can be traced back to the run it was compiled for.
pub fn generate(execution_id: uuid::Uuid, submission: &Submission) -> TemplateResult<GeneratedHarness> {
    let start = Instant::now();

    let function = infer_function_name(&submission.source)?;

    let tests_block = submission
        .tests
        .iter()
        .map(|t| render_test_case(&function, t))
        .collect::<Vec<_>>()
        .join("\n");

    let source = CPP_TEMPLATE
        .replace("// __SOLUTION__", &submission.source)
        .replace("// __TESTS__", &tests_block);

    Ok(GeneratedHarness::new(
        execution_id,
        source,
        submission.tests.len(),
        start.elapsed(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;
    use uuid::Uuid;

    fn submission(source: &str, tests: Vec<TestCase>) -> Submission {
        Submission {
            challenge_id: Uuid::new_v4(),
            code_version_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            source: source.to_string(),
            language: Language::Cpp,
            tests,
        }
    }

    fn test_case(input: &str, expected: &str) -> TestCase {
        TestCase {
            id: Uuid::new_v4(),
            input: input.to_string(),
            expected_output: expected.to_string(),
            custom_validation_code: None,
        }
    }

    #[test]
    fn infers_int_function_name() {
        assert_eq!(
            infer_function_name("int add(int n){return n+1;}").unwrap(),
            "add"
        );
    }

    #[test]
    fn missing_function_declaration_is_an_error() {
        assert!(matches!(
            infer_function_name("auto add(int n){return n+1;}"),
            Err(TemplateError::FunctionNameNotFound)
        ));
    }

    #[test]
    fn integer_literals_are_emitted_unquoted() {
        assert_eq!(render_literal("42"), "42");
        assert_eq!(render_literal("-7"), "-7");
    }

    #[test]
    fn non_integer_literals_are_quoted() {
        assert_eq!(render_literal("hello"), "\"hello\"");
    }

    #[test]
    fn generate_emits_one_test_case_per_test_in_order() {
        let sub = submission(
            "int add(int n){return n+1;}",
            vec![test_case("0", "1"), test_case("5", "6")],
        );
        let harness = generate(Uuid::new_v4(), &sub).unwrap();
        let first = sub.tests[0].id.to_string();
        let second = sub.tests[1].id.to_string();
        let first_pos = harness.source.find(&first).unwrap();
        let second_pos = harness.source.find(&second).unwrap();
        assert!(first_pos < second_pos);
        assert!(harness.source.contains("CHECK(add(0) == 1)"));
        assert!(harness.source.contains("CHECK(add(5) == 6)"));
    }

    #[test]
    fn generate_is_deterministic_given_same_submission() {
        let sub = submission("int add(int n){return n+1;}", vec![test_case("0", "1")]);
        let execution_id = Uuid::new_v4();
        let a = generate(execution_id, &sub).unwrap();
        let b = generate(execution_id, &sub).unwrap();
        assert_eq!(a.source, b.source);
    }
}
