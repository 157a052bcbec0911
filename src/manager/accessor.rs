//! Narrow, kind-specific views of one field.
//!
//! A handle borrows the manager and looks the field up by name on every
//! call, so it never holds live state. Once the field is removed, reads
//! return defaults and writes fail with `FieldNotFound`.

use std::ops::Deref;

use super::{PendingValidation, ValidationManager};
use crate::types::{
    ConfigError, FieldKind, FieldState, IssueFound, SetValueOptions, ValidateOptions,
    ValidationStatus, Value,
};
use crate::validator::ValidatorOverrideChanges;

/// A field looked up through [`ValidationManager::field`].
#[derive(Debug, Clone, Copy)]
pub enum FieldHandle<'a> {
    Input(InputField<'a>),
    Property(PropertyField<'a>),
    Static(StaticField<'a>),
    Calculated(CalculatedField<'a>),
}

impl<'a> FieldHandle<'a> {
    /// `None` for the business-logic pseudo-field, which has no accessor.
    pub(crate) fn new(manager: &'a ValidationManager, name: &'a str, kind: FieldKind) -> Option<Self> {
        let field = FieldRef { manager, name };
        let handle = match kind {
            FieldKind::Input => Self::Input(InputField(PropertyField(field))),
            FieldKind::Property => Self::Property(PropertyField(field)),
            FieldKind::Static => Self::Static(StaticField(field)),
            FieldKind::Calculated => Self::Calculated(CalculatedField(field)),
            FieldKind::BusinessLogic => return None,
        };
        Some(handle)
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Input(_) => FieldKind::Input,
            Self::Property(_) => FieldKind::Property,
            Self::Static(_) => FieldKind::Static,
            Self::Calculated(_) => FieldKind::Calculated,
        }
    }

    /// Read access common to every kind.
    #[must_use]
    pub fn field_ref(&self) -> &FieldRef<'a> {
        match self {
            Self::Input(f) => &f.0 .0,
            Self::Property(f) => &f.0,
            Self::Static(f) => &f.0,
            Self::Calculated(f) => &f.0,
        }
    }

    #[must_use]
    pub fn into_input(self) -> Option<InputField<'a>> {
        match self {
            Self::Input(f) => Some(f),
            _ => None,
        }
    }

    /// Input fields are also properties.
    #[must_use]
    pub fn into_property(self) -> Option<PropertyField<'a>> {
        match self {
            Self::Input(f) => Some(f.0),
            Self::Property(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_static(self) -> Option<StaticField<'a>> {
        match self {
            Self::Static(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_calculated(self) -> Option<CalculatedField<'a>> {
        match self {
            Self::Calculated(f) => Some(f),
            _ => None,
        }
    }
}

/// Read-only access shared by all kinds.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    manager: &'a ValidationManager,
    name: &'a str,
}

impl FieldRef<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.manager.shared.core.borrow().label(self.name)
    }

    /// Current value; calculated fields compute it now.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.manager.value(self.name)
    }

    /// A copy of the field's state, or a fresh one if the field is gone.
    #[must_use]
    pub fn state(&self) -> FieldState {
        self.manager
            .field_state(self.name)
            .unwrap_or_else(|| FieldState::new(self.name))
    }

    #[must_use]
    pub fn status(&self) -> ValidationStatus {
        self.manager.field_status(self.name).unwrap_or_default()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.manager
            .shared
            .core
            .borrow()
            .field_is_enabled(self.name)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn issues_found(&self) -> Vec<IssueFound> {
        self.manager.shared.core.borrow().field_issues(self.name)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.issues_found().iter().any(|i| i.severity.blocks_save())
    }
}

/// A field holding a value with validators.
#[derive(Debug, Clone, Copy)]
pub struct PropertyField<'a>(FieldRef<'a>);

impl<'a> Deref for PropertyField<'a> {
    type Target = FieldRef<'a>;

    fn deref(&self) -> &FieldRef<'a> {
        &self.0
    }
}

impl PropertyField<'_> {
    /// Set the value without validating; dependents that were validated
    /// before are demoted.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<PendingValidation, ConfigError> {
        self.0.manager.set_value(self.0.name, value)
    }

    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_value_with(
        &self,
        value: Option<Value>,
        options: SetValueOptions,
    ) -> Result<PendingValidation, ConfigError> {
        self.0.manager.set_value_with(self.0.name, value, options)
    }

    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn validate(&self, options: &ValidateOptions) -> Result<PendingValidation, ConfigError> {
        self.0.manager.validate_field(self.0.name, options)
    }

    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        self.0.manager.set_enabled(self.0.name, enabled)
    }

    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_validator_overrides(
        &self,
        error_code: &str,
        changes: ValidatorOverrideChanges,
    ) -> Result<(), ConfigError> {
        self.0
            .manager
            .set_validator_overrides(self.0.name, error_code, changes)
    }

    /// Whether a completed validation found nothing blocking and fixed an
    /// earlier failure.
    #[must_use]
    pub fn corrected(&self) -> bool {
        self.state().corrected
    }
}

/// A property edited through raw text.
#[derive(Debug, Clone, Copy)]
pub struct InputField<'a>(PropertyField<'a>);

impl<'a> Deref for InputField<'a> {
    type Target = PropertyField<'a>;

    fn deref(&self) -> &PropertyField<'a> {
        &self.0
    }
}

impl InputField<'_> {
    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_input_value(&self, text: &str) -> Result<PendingValidation, ConfigError> {
        let field = &self.0 .0;
        field.manager.set_input_value(field.name, text)
    }

    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_input_value_with(
        &self,
        text: &str,
        options: SetValueOptions,
    ) -> Result<PendingValidation, ConfigError> {
        let field = &self.0 .0;
        field.manager.set_input_value_with(field.name, text, options)
    }

    #[must_use]
    pub fn input_value(&self) -> Option<String> {
        self.state().input_value
    }

    #[must_use]
    pub fn conversion_error(&self) -> Option<String> {
        self.state().conversion_error
    }
}

/// A value without validation.
#[derive(Debug, Clone, Copy)]
pub struct StaticField<'a>(FieldRef<'a>);

impl<'a> Deref for StaticField<'a> {
    type Target = FieldRef<'a>;

    fn deref(&self) -> &FieldRef<'a> {
        &self.0
    }
}

impl StaticField<'_> {
    /// # Errors
    ///
    /// [`ConfigError::FieldNotFound`] if the field was removed.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<PendingValidation, ConfigError> {
        self.0.manager.set_value(self.0.name, value)
    }
}

/// A value computed from other fields.
#[derive(Debug, Clone, Copy)]
pub struct CalculatedField<'a>(FieldRef<'a>);

impl<'a> Deref for CalculatedField<'a> {
    type Target = FieldRef<'a>;

    fn deref(&self) -> &FieldRef<'a> {
        &self.0
    }
}
