use std::fmt;

use serde::{Deserialize, Serialize};

use super::status::Severity;

/// A rendered, field-scoped validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFound {
    /// Name of the field that owns the issue.
    pub field: String,
    /// Stable key of the rule that produced it; unique within one field.
    pub error_code: String,
    pub severity: Severity,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_message: Option<String>,
}

impl IssueFound {
    pub fn new(
        field: impl Into<String>,
        error_code: impl Into<String>,
        severity: Severity,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            error_code: error_code.into(),
            severity,
            error_message: error_message.into(),
            summary_message: None,
        }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary_message = Some(summary.into());
        self
    }
}

impl fmt::Display for IssueFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.field, self.error_code, self.severity, self.error_message
        )
    }
}

/// Insert `issue` into `list`, replacing any entry with the same error code
/// in place so that codes stay unique and positions stay stable.
pub(crate) fn upsert_issue(list: &mut Vec<IssueFound>, issue: IssueFound) {
    match list.iter_mut().find(|i| i.error_code == issue.error_code) {
        Some(slot) => *slot = issue,
        None => list.push(issue),
    }
}

/// An error injected from outside the rule pipeline, e.g. a server-side check.
///
/// `field` may be omitted, in which case the error lands on the
/// business-logic pseudo-field. A missing `error_code` is replaced by a
/// generated `GENERATED_<n>` code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessLogicError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl BusinessLogicError {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary_message = Some(summary.into());
        self
    }

    /// Render into an issue for `field` using an already-resolved code.
    pub(crate) fn into_issue(self, field: &str, code: String) -> IssueFound {
        IssueFound {
            field: field.to_owned(),
            error_code: code,
            severity: self.severity.unwrap_or(Severity::Error),
            error_message: self.error_message,
            summary_message: self.summary_message,
        }
    }
}
