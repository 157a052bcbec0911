use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-field validation status.
///
/// `Disabled` is derived from the field's enabled flag when the status is
/// read; it is never stored in [`FieldState`](super::FieldState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[default]
    NotAttempted,
    NeedsValidation,
    Valid,
    Invalid,
    /// Validation ran but an asynchronous condition is still in flight and no
    /// synchronous issue was found.
    Undetermined,
    Disabled,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::NotAttempted => "not attempted",
            ValidationStatus::NeedsValidation => "needs validation",
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Undetermined => "undetermined",
            ValidationStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// How serious an issue is. Ordered `Warning < Error < Severe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Reported but never blocks saving.
    Warning,
    Error,
    /// Used by default for required and data-type rules.
    Severe,
}

impl Severity {
    /// Whether an issue of this severity prevents saving.
    #[must_use]
    pub fn blocks_save(self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Severe => f.write_str("severe"),
        }
    }
}

/// Tri-state outcome of evaluating a condition.
///
/// `Undetermined` covers "cannot decide" (missing comparison value, type
/// mismatch) and is never reported as an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionResult {
    Match,
    NoMatch,
    Undetermined,
}

impl ConditionResult {
    #[must_use]
    pub fn from_bool(matched: bool) -> Self {
        if matched {
            ConditionResult::Match
        } else {
            ConditionResult::NoMatch
        }
    }

    /// Map an optional comparison outcome, `None` meaning undetermined.
    #[must_use]
    pub fn from_option(matched: Option<bool>) -> Self {
        matched.map_or(ConditionResult::Undetermined, Self::from_bool)
    }
}
