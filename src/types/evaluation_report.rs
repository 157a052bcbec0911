use std::fmt;

use super::issue::IssueFound;
use super::status::{ConditionResult, ValidationStatus};

/// Outcome of one validator that actually ran its condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorOutcome {
    pub error_code: String,
    pub condition_result: ConditionResult,
    /// Present only when the condition returned `NoMatch`.
    pub issue_found: Option<IssueFound>,
}

/// Report returned by validating a single field.
///
/// A field that had nothing to check (no validators, or all of them skipped,
/// and no business-logic errors) yields no report at all rather than an
/// empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ValueHostValidateResult {
    field: String,
    status: ValidationStatus,
    issues_found: Vec<IssueFound>,
    outcomes: Vec<ValidatorOutcome>,
    corrected: bool,
    pending: bool,
}

impl ValueHostValidateResult {
    pub(crate) fn new(
        field: String,
        status: ValidationStatus,
        issues_found: Vec<IssueFound>,
        outcomes: Vec<ValidatorOutcome>,
        corrected: bool,
        pending: bool,
    ) -> Self {
        Self {
            field,
            status,
            issues_found,
            outcomes,
            corrected,
            pending,
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    #[must_use]
    pub fn issues_found(&self) -> &[IssueFound] {
        &self.issues_found
    }

    /// Per-validator outcomes for the validators that ran synchronously.
    #[must_use]
    pub fn outcomes(&self) -> &[ValidatorOutcome] {
        &self.outcomes
    }

    /// `true` when this pass turned a previously invalid field valid.
    #[must_use]
    pub fn corrected(&self) -> bool {
        self.corrected
    }

    /// Whether asynchronous validators are still running.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending
    }
}

impl fmt::Display for ValueHostValidateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.status)?;
        let codes: Vec<&str> = self
            .issues_found
            .iter()
            .map(|i| i.error_code.as_str())
            .collect();
        write!(f, ", issues: [{}]", codes.join(", "))?;
        if self.pending {
            write!(f, ", pending")?;
        }
        Ok(())
    }
}
