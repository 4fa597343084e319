//! Error classification and recovery hints.

use pretty_assertions::assert_eq;

use colloquy::delta::DeltaError;
use colloquy::error::{ColloquyError, ErrorCategory, RecoverySuggestion};

#[test]
fn api_error_display() {
    let err = ColloquyError::api(404, "Not found");
    assert!(matches!(&err, ColloquyError::Api { status: 404, .. }));
    assert_eq!(err.to_string(), "API error (status 404): Not found");
}

#[test]
fn helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: ColloquyError,
        category: ErrorCategory,
        retryable: bool,
        recovery: RecoverySuggestion,
    }

    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: ColloquyError::api(401, "bad key"),
            category: ErrorCategory::Authentication,
            retryable: false,
            recovery: RecoverySuggestion::CheckCredentials,
        },
        Case {
            error: ColloquyError::api(429, "slow down"),
            category: ErrorCategory::RateLimit,
            retryable: true,
            recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: ColloquyError::api(502, "bad gateway"),
            category: ErrorCategory::Server,
            retryable: true,
            recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: ColloquyError::Io(io_error),
            category: ErrorCategory::Transport,
            retryable: true,
            recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: ColloquyError::Timeout(30_000),
            category: ErrorCategory::Transport,
            retryable: true,
            recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: ColloquyError::Serialization(serde_error),
            category: ErrorCategory::Protocol,
            retryable: false,
            recovery: RecoverySuggestion::ReportBug,
        },
        Case {
            error: ColloquyError::Delta(DeltaError::MissingIndex { position: 2 }),
            category: ErrorCategory::Precondition,
            retryable: false,
            recovery: RecoverySuggestion::ReportBug,
        },
        Case {
            error: ColloquyError::UnresolvedTool {
                name: "ghost".into(),
            },
            category: ErrorCategory::UnresolvedTool,
            retryable: false,
            recovery: RecoverySuggestion::CheckToolRegistry,
        },
        Case {
            error: ColloquyError::ToolExecution {
                tool_name: "weather".into(),
                message: "HTTP 500".into(),
            },
            category: ErrorCategory::ToolExecution,
            retryable: false,
            recovery: RecoverySuggestion::CheckToolRegistry,
        },
        Case {
            error: ColloquyError::Configuration("model is required".into()),
            category: ErrorCategory::Configuration,
            retryable: false,
            recovery: RecoverySuggestion::CheckConfiguration,
        },
        Case {
            error: ColloquyError::Canceled,
            category: ErrorCategory::Cancellation,
            retryable: false,
            recovery: RecoverySuggestion::None,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.category, "{}", case.error);
        assert_eq!(case.error.is_retryable(), case.retryable, "{}", case.error);
        assert_eq!(case.error.recovery_suggestion(), case.recovery, "{}", case.error);
    }
}

#[test]
fn only_canceled_counts_as_cancellation() {
    assert!(ColloquyError::Canceled.is_cancellation());
    assert!(!ColloquyError::Timeout(10).is_cancellation());
}

#[test]
fn tool_messages_name_the_tool() {
    let unresolved = ColloquyError::UnresolvedTool {
        name: "ghost".into(),
    };
    assert_eq!(unresolved.to_string(), "Tool 'ghost' is not registered");

    let failed = ColloquyError::ToolExecution {
        tool_name: "weather".into(),
        message: "HTTP 500".into(),
    };
    assert_eq!(failed.to_string(), "Tool execution error: weather: HTTP 500");
}

#[test]
fn delta_errors_convert() {
    let err: ColloquyError = DeltaError::IndexOutOfRange { index: 1 << 20 }.into();
    assert!(matches!(err, ColloquyError::Delta(_)));
}

#[test]
fn category_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
    assert_eq!(json, "\"rate_limit\"");
}
