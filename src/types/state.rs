use serde::{Deserialize, Serialize};

use super::issue::IssueFound;
use super::status::{Severity, ValidationStatus};
use super::value::Value;

/// Persistable snapshot of one field.
///
/// Hosts never mutate a `FieldState` in place: every transition builds a new
/// value and the host compares old and new to decide whether to notify.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Raw text of an input field, before conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,
    #[serde(default)]
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues_found: Vec<IssueFound>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_logic_errors: Vec<IssueFound>,
    #[serde(default)]
    pub async_processing: bool,
    #[serde(default)]
    pub corrected: bool,
    /// Runtime override of the configured enabled flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Status produced by the most recent completed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<ValidationStatus>,
}

impl FieldState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Issues as reported to callers: rule issues not shadowed by a
    /// business-logic error of the same code, followed by business-logic
    /// errors.
    #[must_use]
    pub fn merged_issues(&self) -> Vec<IssueFound> {
        let mut out: Vec<IssueFound> = self
            .issues_found
            .iter()
            .filter(|i| {
                !self
                    .business_logic_errors
                    .iter()
                    .any(|b| b.error_code == i.error_code)
            })
            .cloned()
            .collect();
        out.extend(self.business_logic_errors.iter().cloned());
        out
    }

    /// Whether any reported issue blocks saving. A rule issue whose code is
    /// taken over by a business-logic error does not count.
    #[must_use]
    pub fn has_blocking_issue(&self) -> bool {
        self.business_logic_errors
            .iter()
            .chain(self.issues_found.iter().filter(|i| {
                !self
                    .business_logic_errors
                    .iter()
                    .any(|b| b.error_code == i.error_code)
            }))
            .any(|i| i.severity.blocks_save())
    }

    pub(crate) fn has_blocking_business_logic_error(&self) -> bool {
        self.business_logic_errors
            .iter()
            .any(|i| i.severity != Severity::Warning)
    }
}

/// Opaque orchestrator counters carried alongside field states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManagerState {
    /// Next suffix used for generated business-logic error codes.
    #[serde(default)]
    pub generated_code_seed: u32,
}

impl ManagerState {
    /// Take the next generated error code (`GENERATED_0`, `GENERATED_1`, ...).
    pub fn next_generated_code(&mut self) -> String {
        let code = format!("GENERATED_{}", self.generated_code_seed);
        self.generated_code_seed = self.generated_code_seed.wrapping_add(1);
        code
    }
}

/// Everything needed to recreate a manager's runtime state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    #[serde(default)]
    pub manager_state: ManagerState,
    #[serde(default)]
    pub field_states: Vec<FieldState>,
}

impl ManagerSnapshot {
    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a value cannot be represented.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] on malformed input.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.field_states.iter().find(|s| s.name == name)
    }

    /// Encode into the framed binary form.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding
    /// fails.
    #[cfg(feature = "binary-snapshot")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self)
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// format, integrity, or validation failure.
    #[cfg(feature = "binary-snapshot")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on
    /// encoding or I/O failure.
    #[cfg(feature = "binary-snapshot")]
    pub fn to_binary_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), crate::serial::SerializeError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    #[cfg(feature = "binary-snapshot")]
    pub fn from_binary_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
