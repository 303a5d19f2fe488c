//! Error types for decoy operations
//!
//! Every failure surfaces as a [`MockError`]. The phase that produced it is
//! the enum variant; [`MockError::reason`] gives a flat code for callers that
//! only want to branch on the kind of failure.

use std::fmt;
use thiserror::Error;

/// Errors raised while a setup or mock is being configured.
///
/// These are surfaced at build time, never deferred to the first invocation,
/// with one exception: [`ConfigError::ResponseRequired`] is detected when a
/// strict mock dispatches to a setup that has no response for a non-void
/// member.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Expression is not a property accessor: {expression}")]
    NotAProperty { expression: String },

    #[error("Type {type_name} cannot be mocked: {reason}")]
    Unmockable { type_name: String, reason: String },

    #[error("Unsupported expression {expression}: {reason}")]
    UnsupportedExpression { expression: String, reason: String },

    #[error("{member} expects {expected} argument(s), but {actual} were supplied")]
    ArgumentCount {
        member: String,
        expected: usize,
        actual: usize,
    },

    #[error("{member} expects {expected} generic argument(s), but {actual} were supplied")]
    GenericArgumentCount {
        member: String,
        expected: usize,
        actual: usize,
    },

    #[error("Delegate for {member} takes {delegate} parameter(s), but the member declares {declared}")]
    DelegateArity {
        member: String,
        delegate: usize,
        declared: usize,
    },

    #[error("Delegate parameter {position} for {member} has type {delegate_type}, which cannot accept {param_type}")]
    DelegateParameterType {
        member: String,
        position: usize,
        delegate_type: String,
        param_type: String,
    },

    #[error("{member} returns {expected}, which cannot hold a value of type {actual}")]
    ReturnTypeMismatch {
        member: String,
        expected: String,
        actual: String,
    },

    #[error("Setup {setup} already has a response configured ({existing})")]
    ResponseAlreadySet { setup: String, existing: String },

    #[error("Execution limit for {setup} must be at least 1, got {limit}")]
    InvalidExecutionLimit { setup: String, limit: u32 },

    #[error("Execution limit for {setup} is already configured")]
    ExecutionLimitAlreadySet { setup: String },

    #[error("Matcher of type {matcher_type} is incompatible with parameter {param} of type {param_type}")]
    IncompatibleMatcher {
        param: String,
        matcher_type: String,
        param_type: String,
    },

    #[error("Value {value} cannot be passed to parameter {param} of type {param_type}")]
    IncompatibleArgument {
        param: String,
        value: String,
        param_type: String,
    },

    #[error("Position {position} of {member} is not a ref or out parameter")]
    NotByRef { member: String, position: usize },

    #[error("Invalid regular expression {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Matcher observers released out of order: observer {released} released while {active} is active")]
    ObserverOrder { released: u64, active: u64 },

    #[error("{member} returns {return_type}, but the matching setup has no return value and the mock is strict")]
    ResponseRequired { member: String, return_type: String },
}

/// Errors raised while an invocation is being dispatched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{signature} invocation failed with mock behavior Strict. All invocations on the mock must have a corresponding setup.{}", render_candidates(.candidates))]
    NoSetup {
        signature: String,
        candidates: Vec<String>,
    },

    #[error("Setup {setup} is limited to {limit} invocation(s), but was invoked {count} times")]
    ExecutionLimitExceeded {
        setup: String,
        limit: u32,
        count: u32,
    },

    #[error("Argument {position} of {member} cannot be converted to {expected}: {value}")]
    ArgumentConversion {
        member: String,
        position: usize,
        expected: String,
        value: String,
    },

    #[error("Mock lock poisoned: {resource}")]
    LockPoisoned { resource: String },
}

/// Errors raised by the verification engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Mock {mock}:\nThe following setups were not matched:\n{}", render_lines(.failures))]
    UnmatchedSetups { mock: String, failures: Vec<String> },

    #[error("{expected}\n  {call}\n\n{dump}")]
    CallCount {
        expected: String,
        call: String,
        actual: usize,
        dump: String,
    },

    #[error("Mock {mock}:\nThe following invocations were not verified:\n{}", render_lines(.invocations))]
    UnverifiedInvocations {
        mock: String,
        invocations: Vec<String>,
    },

    #[error("{} verification failure(s):\n{}", .failures.len(), .failures.join("\n\n"))]
    Aggregate { failures: Vec<String> },
}

fn render_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    format!(
        "\nSetups for this member that did not match:\n{}",
        render_lines(candidates)
    )
}

fn render_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flat reason code for a [`MockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockErrorReason {
    UnsupportedExpression,
    UnmockableType,
    DelegateMismatch,
    ResponseAlreadySet,
    InvalidExecutionLimit,
    IncompatibleMatcher,
    InvalidConfiguration,
    ObserverMisuse,
    ReturnValueRequired,
    NoSetup,
    ExecutionLimitExceeded,
    ArgumentConversion,
    LockPoisoned,
    UnmatchedSetup,
    IncorrectNumberOfCalls,
    UnverifiedInvocation,
}

impl MockErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MockErrorReason::UnsupportedExpression => "unsupported_expression",
            MockErrorReason::UnmockableType => "unmockable_type",
            MockErrorReason::DelegateMismatch => "delegate_mismatch",
            MockErrorReason::ResponseAlreadySet => "response_already_set",
            MockErrorReason::InvalidExecutionLimit => "invalid_execution_limit",
            MockErrorReason::IncompatibleMatcher => "incompatible_matcher",
            MockErrorReason::InvalidConfiguration => "invalid_configuration",
            MockErrorReason::ObserverMisuse => "observer_misuse",
            MockErrorReason::ReturnValueRequired => "return_value_required",
            MockErrorReason::NoSetup => "no_setup",
            MockErrorReason::ExecutionLimitExceeded => "execution_limit_exceeded",
            MockErrorReason::ArgumentConversion => "argument_conversion",
            MockErrorReason::LockPoisoned => "lock_poisoned",
            MockErrorReason::UnmatchedSetup => "unmatched_setup",
            MockErrorReason::IncorrectNumberOfCalls => "incorrect_number_of_calls",
            MockErrorReason::UnverifiedInvocation => "unverified_invocation",
        }
    }

    /// Whether this reason belongs to the configuration phase.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MockErrorReason::UnsupportedExpression
                | MockErrorReason::UnmockableType
                | MockErrorReason::DelegateMismatch
                | MockErrorReason::ResponseAlreadySet
                | MockErrorReason::InvalidExecutionLimit
                | MockErrorReason::IncompatibleMatcher
                | MockErrorReason::InvalidConfiguration
                | MockErrorReason::ObserverMisuse
                | MockErrorReason::ReturnValueRequired
        )
    }
}

impl fmt::Display for MockErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Master error type for all decoy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MockError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    Verify(#[from] VerifyError),
}

impl MockError {
    /// Reason code for this error.
    pub fn reason(&self) -> MockErrorReason {
        match self {
            MockError::Config(e) => match e {
                ConfigError::NotAProperty { .. }
                | ConfigError::UnsupportedExpression { .. }
                | ConfigError::ArgumentCount { .. }
                | ConfigError::GenericArgumentCount { .. }
                | ConfigError::NotByRef { .. } => MockErrorReason::UnsupportedExpression,
                ConfigError::Unmockable { .. } => MockErrorReason::UnmockableType,
                ConfigError::DelegateArity { .. }
                | ConfigError::DelegateParameterType { .. }
                | ConfigError::ReturnTypeMismatch { .. } => MockErrorReason::DelegateMismatch,
                ConfigError::ResponseAlreadySet { .. } => MockErrorReason::ResponseAlreadySet,
                ConfigError::InvalidExecutionLimit { .. }
                | ConfigError::ExecutionLimitAlreadySet { .. } => {
                    MockErrorReason::InvalidExecutionLimit
                }
                ConfigError::IncompatibleMatcher { .. }
                | ConfigError::IncompatibleArgument { .. } => MockErrorReason::IncompatibleMatcher,
                ConfigError::InvalidPattern { .. }
                | ConfigError::InvalidValue { .. }
                | ConfigError::Parse { .. } => MockErrorReason::InvalidConfiguration,
                ConfigError::ObserverOrder { .. } => MockErrorReason::ObserverMisuse,
                ConfigError::ResponseRequired { .. } => MockErrorReason::ReturnValueRequired,
            },
            MockError::Dispatch(e) => match e {
                DispatchError::NoSetup { .. } => MockErrorReason::NoSetup,
                DispatchError::ExecutionLimitExceeded { .. } => {
                    MockErrorReason::ExecutionLimitExceeded
                }
                DispatchError::ArgumentConversion { .. } => MockErrorReason::ArgumentConversion,
                DispatchError::LockPoisoned { .. } => MockErrorReason::LockPoisoned,
            },
            MockError::Verify(e) => match e {
                VerifyError::UnmatchedSetups { .. } => MockErrorReason::UnmatchedSetup,
                VerifyError::CallCount { .. } => MockErrorReason::IncorrectNumberOfCalls,
                VerifyError::UnverifiedInvocations { .. } => MockErrorReason::UnverifiedInvocation,
                VerifyError::Aggregate { .. } => MockErrorReason::UnmatchedSetup,
            },
        }
    }

    /// Shorthand for a poisoned-lock dispatch error.
    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        MockError::Dispatch(DispatchError::LockPoisoned {
            resource: resource.into(),
        })
    }
}

/// Result type alias for decoy operations.
pub type MockResult<T> = Result<T, MockError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_setup_display_lists_candidates() {
        let err = DispatchError::NoSetup {
            signature: "IService.method(2, \"a\")".to_string(),
            candidates: vec!["mock.method(1, \"a\")".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("IService.method(2, \"a\")"));
        assert!(msg.contains("Strict"));
        assert!(msg.contains("mock.method(1, \"a\")"));
    }

    #[test]
    fn test_no_setup_display_without_candidates() {
        let err = DispatchError::NoSetup {
            signature: "IService.ping()".to_string(),
            candidates: vec![],
        };
        let msg = format!("{}", err);
        assert!(!msg.contains("did not match"));
    }

    #[test]
    fn test_execution_limit_display() {
        let err = DispatchError::ExecutionLimitExceeded {
            setup: "mock.ping()".to_string(),
            limit: 3,
            count: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("mock.ping()"));
        assert!(msg.contains('3'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_incompatible_matcher_names_both_types() {
        let err = ConfigError::IncompatibleMatcher {
            param: "count".to_string(),
            matcher_type: "string".to_string(),
            param_type: "int".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("string"));
        assert!(msg.contains("int"));
    }

    #[test]
    fn test_reason_codes() {
        let config: MockError = ConfigError::InvalidExecutionLimit {
            setup: "s".to_string(),
            limit: 0,
        }
        .into();
        assert_eq!(config.reason(), MockErrorReason::InvalidExecutionLimit);
        assert!(config.reason().is_configuration());

        let dispatch: MockError = DispatchError::NoSetup {
            signature: "x".to_string(),
            candidates: vec![],
        }
        .into();
        assert_eq!(dispatch.reason(), MockErrorReason::NoSetup);
        assert!(!dispatch.reason().is_configuration());

        let verify: MockError = VerifyError::CallCount {
            expected: "e".to_string(),
            call: "c".to_string(),
            actual: 0,
            dump: "d".to_string(),
        }
        .into();
        assert_eq!(verify.reason(), MockErrorReason::IncorrectNumberOfCalls);
        assert_eq!(verify.reason().to_string(), "incorrect_number_of_calls");
    }
}
