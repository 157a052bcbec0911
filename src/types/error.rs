use thiserror::Error;

use super::config::FieldKind;

/// Configuration faults: programmer errors surfaced when fields are built
/// or reconfigured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rule {rule_index} of field '{field}' has neither a condition nor a condition creator")]
    MissingCondition { field: String, rule_index: usize },

    #[error("rule {rule_index} of field '{field}' has both a condition and a condition creator")]
    ConflictingCondition { field: String, rule_index: usize },

    #[error("unknown condition type '{condition_type}'")]
    UnknownConditionType { condition_type: String },

    #[error("condition '{condition_type}' parameter '{param}': {reason}")]
    InvalidParameter {
        condition_type: String,
        param: String,
        reason: String,
    },

    #[error("undefined field '{reference}' referenced by field '{field}'")]
    UnknownField { field: String, reference: String },

    #[error("duplicate field name '{name}'")]
    DuplicateField { name: String },

    #[error("duplicate error code '{code}' on field '{field}'")]
    DuplicateErrorCode { field: String, code: String },

    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("calculated field '{field}' has no calculation")]
    MissingCalculation { field: String },

    #[error("'{name}' is reserved for business-logic errors")]
    ReservedName { name: String },

    #[error("no field named '{name}'")]
    FieldNotFound { name: String },

    #[error("field '{name}' does not support validation")]
    NotValidatable { name: String },
    #[error("{kind} field '{name}' does not support {operation}")]
    Unsupported {
        name: String,
        kind: FieldKind,
        operation: &'static str,
    },
}

/// A fault raised from inside a condition's evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("condition '{condition_type}' failed: {message}")]
pub struct ConditionError {
    pub condition_type: String,
    pub message: String,
}

impl ConditionError {
    pub fn new(condition_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            message: message.into(),
        }
    }
}

/// Faults surfaced to the caller awaiting an asynchronous validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("asynchronous rule '{error_code}' on field '{field}' was rejected: {source}")]
    AsyncCondition {
        field: String,
        error_code: String,
        #[source]
        source: ConditionError,
    },
}
