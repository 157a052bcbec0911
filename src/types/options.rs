/// Options for a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Only validate fields tagged with this group.
    pub group: Option<String>,
    /// Skip required-type rules; used before the user had a chance to type.
    pub preliminary: bool,
    /// Evaluate the raw text being typed; rules without edit-time support
    /// are skipped.
    pub during_edit: bool,
    pub skip_callbacks: bool,
}

impl ValidateOptions {
    #[must_use]
    pub fn group(group: &str) -> Self {
        Self {
            group: Some(group.to_owned()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn preliminary() -> Self {
        Self {
            preliminary: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn during_edit() -> Self {
        Self {
            during_edit: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.skip_callbacks = true;
        self
    }
}

/// Options for `set_value` and `set_input_value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    /// Validate the field right away and re-validate fields that depend on
    /// it. Without this, dependents are only marked as needing validation.
    pub validate: bool,
    /// With `validate`, run the edit-time pass over the input text.
    pub during_edit: bool,
    pub skip_callbacks: bool,
}

impl SetValueOptions {
    #[must_use]
    pub fn validate() -> Self {
        Self {
            validate: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn during_edit() -> Self {
        Self {
            validate: true,
            during_edit: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.skip_callbacks = true;
        self
    }
}

/// What `set_issues_found` does with an issue whose error code matches no
/// validator of the target field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingCodeBehavior {
    /// Record it anyway.
    #[default]
    Keep,
    /// Drop it without changing state.
    Omit,
}
