//! Golden tests - fixture-based tests that lock expected behavior
//!
//! These tests use JSON fixtures to verify that critical functions produce
//! expected outputs. Any change in behavior will cause these tests to fail,
//! signaling a potential breaking change.
//!
//! Run with: cargo test --test golden_tests

use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
struct Fixture<T> {
    test_cases: Vec<T>,
}

fn load<T: for<'de> Deserialize<'de>>(path: &str) -> Fixture<T> {
    let content =
        fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
    serde_json::from_str(&content).expect("Failed to parse fixture JSON")
}

// ============================================================================
// DESTINATION VALIDATION GOLDEN TESTS
// ============================================================================

mod destination_golden {
    use super::*;
    use imessage_mcp::automation::{validate_destination, DestinationKind};

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        expected: Expected,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum Expected {
        Ok { ok: String, kind: String },
        Err { err: String },
    }

    #[test]
    fn test_destination_validation_golden() {
        let fixture: Fixture<TestCase> = load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/destinations.json"
        ));

        for case in fixture.test_cases {
            let result = validate_destination(&case.input);

            match case.expected {
                Expected::Ok { ok, kind } => {
                    let (value, actual_kind) = result.unwrap_or_else(|e| {
                        panic!("Case '{}': expected Ok({:?}), got Err({})", case.name, ok, e)
                    });
                    assert_eq!(value, ok, "Case '{}': normalized value mismatch", case.name);
                    let actual_kind = match actual_kind {
                        DestinationKind::Phone => "phone",
                        DestinationKind::Email => "email",
                    };
                    assert_eq!(actual_kind, kind, "Case '{}': kind mismatch", case.name);
                }
                Expected::Err { err } => {
                    let actual = result.err().unwrap_or_else(|| {
                        panic!("Case '{}': expected Err({}), got Ok", case.name, err)
                    });
                    assert_eq!(
                        actual.kind().to_string(),
                        err,
                        "Case '{}': error kind mismatch",
                        case.name
                    );
                }
            }
        }
    }
}

// ============================================================================
// APPLESCRIPT ERROR CLASSIFICATION GOLDEN TESTS
// ============================================================================

mod applescript_golden {
    use super::*;
    use imessage_mcp::automation::{classify_failure, ScriptFailure};

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        stderr: String,
        expected: String,
    }

    #[test]
    fn test_applescript_error_classification_golden() {
        let fixture: Fixture<TestCase> = load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/applescript_errors.json"
        ));

        for case in fixture.test_cases {
            let failure = ScriptFailure::Exit {
                code: Some(1),
                stderr: case.stderr.clone(),
            };
            let err = classify_failure(&failure, "target");
            assert_eq!(
                err.kind().to_string(),
                case.expected,
                "Case '{}': stderr={:?}",
                case.name,
                case.stderr
            );
        }
    }
}

// ============================================================================
// SINCE PARSING GOLDEN TESTS
// ============================================================================

mod since_golden {
    use super::*;
    use imessage_mcp::types::parse_since;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        expected: Expected,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum Expected {
        Ok { ok: String },
        Err { err: String },
    }

    #[test]
    fn test_since_parsing_golden() {
        let fixture: Fixture<TestCase> = load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/since_parsing.json"
        ));

        for case in fixture.test_cases {
            let result = parse_since(&case.input);
            match case.expected {
                Expected::Ok { ok } => {
                    let dt = result.unwrap_or_else(|e| {
                        panic!("Case '{}': expected Ok({}), got Err({})", case.name, ok, e)
                    });
                    assert_eq!(dt.to_rfc3339(), ok, "Case '{}'", case.name);
                }
                Expected::Err { err } => {
                    let actual = result.err().unwrap_or_else(|| {
                        panic!("Case '{}': expected Err({}), got Ok", case.name, err)
                    });
                    assert_eq!(actual.kind().to_string(), err, "Case '{}'", case.name);
                }
            }
        }
    }
}
