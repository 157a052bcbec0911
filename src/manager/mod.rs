//! The orchestrator.
//!
//! [`ValidationManager`] owns every field host, runs validation across them,
//! collects business-logic errors and reports a single [`ValidationVerdict`].
//! It is a single-threaded handle: state sits behind a `RefCell` and every
//! call borrows it once, queues notifications, releases the borrow, and only
//! then runs callbacks.

mod accessor;
mod core;
mod notify;
mod pending;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

pub use accessor::{CalculatedField, FieldHandle, FieldRef, InputField, PropertyField, StaticField};
pub use pending::PendingValidation;

use self::core::{Core, PassOutput};
use self::notify::{Callbacks, Shared};
use crate::merge::MergeMode;
use crate::services::Services;
use crate::types::{
    BusinessLogicError, ConfigError, FieldConfig, FieldState, IssueFound, ManagerSnapshot,
    MissingCodeBehavior, SetValueOptions, ValidateOptions, ValidationStatus, ValidationVerdict,
    Value,
};
use crate::validator::ValidatorOverrideChanges;

/// Debounce window used when the builder is given no `notify_delay`.
pub const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_millis(100);

/// Builder for [`ValidationManager`].
#[must_use]
pub struct ValidationManagerBuilder {
    services: Services,
    fields: Vec<FieldConfig>,
    snapshot: Option<ManagerSnapshot>,
    notify_delay: Option<Duration>,
    callbacks: Callbacks,
}

impl ValidationManagerBuilder {
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldConfig>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    /// Resume from a saved snapshot. States for fields not configured yet
    /// are held until a matching field is added.
    pub fn snapshot(mut self, snapshot: ManagerSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Coalescing window for verdict notifications. `Duration::ZERO` fires on
    /// every change.
    pub fn notify_delay(mut self, delay: Duration) -> Self {
        self.notify_delay = Some(delay);
        self
    }

    pub fn on_field_state_changed(mut self, f: impl Fn(&FieldState) + 'static) -> Self {
        self.callbacks.field_state = Some(Box::new(f));
        self
    }

    pub fn on_verdict_changed(mut self, f: impl Fn(&ValidationVerdict) + 'static) -> Self {
        self.callbacks.verdict = Some(Box::new(f));
        self
    }

    pub fn on_value_changed(mut self, f: impl Fn(&str, Option<&Value>) + 'static) -> Self {
        self.callbacks.value = Some(Box::new(f));
        self
    }

    pub fn on_config_changed(mut self, f: impl Fn(&[Arc<FieldConfig>]) + 'static) -> Self {
        self.callbacks.config = Some(Box::new(f));
        self
    }

    /// Compile the fields and create the manager. No callback fires.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any field or rule is misconfigured.
    pub fn build(self) -> Result<ValidationManager, ConfigError> {
        let delay = self.notify_delay.unwrap_or(DEFAULT_NOTIFY_DELAY);
        let mut core = Core::new(self.services, delay, self.snapshot);
        core.apply_config(self.fields, &MergeMode::Replace, Vec::new(), true)?;
        debug!(fields = core.field_names().len(), "validation manager built");
        Ok(ValidationManager {
            shared: Rc::new(Shared {
                core: std::cell::RefCell::new(core),
                callbacks: self.callbacks,
            }),
        })
    }
}

/// Runs validation across a set of named fields.
///
/// ```
/// use fieldcheck::{ConditionDescriptor, FieldConfig, Services, ValidateOptions, ValidationManager};
///
/// let manager = ValidationManager::builder(Services::default())
///     .field(FieldConfig::property("Age").validate_with(ConditionDescriptor::require()))
///     .build()
///     .unwrap();
/// let pending = manager.validate(&ValidateOptions::default());
/// assert!(!pending.verdict().is_valid());
/// ```
pub struct ValidationManager {
    shared: Rc<Shared>,
}

impl fmt::Debug for ValidationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.borrow();
        f.debug_struct("ValidationManager")
            .field("fields", &core.field_names())
            .field("disposed", &core.disposed)
            .finish_non_exhaustive()
    }
}

impl ValidationManager {
    pub fn builder(services: Services) -> ValidationManagerBuilder {
        ValidationManagerBuilder {
            services,
            fields: Vec::new(),
            snapshot: None,
            notify_delay: None,
            callbacks: Callbacks::default(),
        }
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let out = f(&mut self.shared.core.borrow_mut());
        self.shared.flush();
        out
    }

    fn read<R>(&self, f: impl FnOnce(&Core) -> R) -> R {
        f(&self.shared.core.borrow())
    }

    fn pending(&self, out: PassOutput, skip_callbacks: bool) -> PendingValidation {
        let verdict = self.read(Core::verdict);
        PendingValidation::new(
            verdict,
            out.results,
            out.rules,
            Rc::downgrade(&self.shared),
            skip_callbacks,
        )
    }

    /// Set a field's value without validating it.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name, `Unsupported` for a calculated
    /// field.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<PendingValidation, ConfigError> {
        self.set_value_with(name, Some(value.into()), SetValueOptions::default())
    }

    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name, `Unsupported` for a calculated
    /// field.
    pub fn set_value_with(
        &self,
        name: &str,
        value: Option<Value>,
        options: SetValueOptions,
    ) -> Result<PendingValidation, ConfigError> {
        let out = self.with_core(|core| core.set_value(name, value, options))?;
        Ok(self.pending(out, options.skip_callbacks))
    }

    /// Set the raw text of an input field; it is converted by the
    /// configured [`ValueConverter`](crate::ValueConverter).
    ///
    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name, `Unsupported` for any field
    /// that is not an input.
    pub fn set_input_value(&self, name: &str, text: &str) -> Result<PendingValidation, ConfigError> {
        self.set_input_value_with(name, text, SetValueOptions::default())
    }

    /// # Errors
    ///
    /// See [`set_input_value`](Self::set_input_value).
    pub fn set_input_value_with(
        &self,
        name: &str,
        text: &str,
        options: SetValueOptions,
    ) -> Result<PendingValidation, ConfigError> {
        let out = self.with_core(|core| core.set_input_value(name, text, options))?;
        Ok(self.pending(out, options.skip_callbacks))
    }

    /// Validate every enabled field (or one group) and the business-logic
    /// pseudo-field. The verdict callback fires right away.
    pub fn validate(&self, options: &ValidateOptions) -> PendingValidation {
        let (verdict, out) = self.with_core(|core| core.validate(options));
        PendingValidation::new(
            verdict,
            out.results,
            out.rules,
            Rc::downgrade(&self.shared),
            options.skip_callbacks,
        )
    }

    /// Validate one field.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name, `NotValidatable` for static and
    /// calculated fields.
    pub fn validate_field(&self, name: &str, options: &ValidateOptions) -> Result<PendingValidation, ConfigError> {
        let out = self.with_core(|core| core.validate_field(name, options))?;
        Ok(self.pending(out, options.skip_callbacks))
    }

    /// Reset every field (or one group) to `NotAttempted`, dropping issues
    /// and business-logic errors.
    pub fn clear_validation(&self, options: &ValidateOptions) {
        self.with_core(|core| core.clear_validation(options));
    }

    /// Record one externally produced error. Returns `true` if it blocks
    /// saving.
    pub fn set_business_logic_error(&self, error: BusinessLogicError) -> bool {
        self.set_business_logic_errors(vec![error], false)
    }

    pub fn set_business_logic_errors(&self, errors: Vec<BusinessLogicError>, skip_callbacks: bool) -> bool {
        self.with_core(|core| core.set_business_logic_errors(errors, skip_callbacks))
    }

    pub fn clear_business_logic_errors(&self, skip_callbacks: bool) {
        self.with_core(|core| core.clear_business_logic_errors(skip_callbacks));
    }

    /// Import issues, for example from a saved session or a server response.
    /// Each named field's rule issues are replaced by the ones given.
    pub fn set_issues_found(&self, issues: Vec<IssueFound>, behavior: MissingCodeBehavior) {
        self.with_core(|core| core.set_issues_found(issues, behavior, false));
    }

    #[must_use]
    pub fn issues_found(&self, group: Option<&str>) -> Vec<IssueFound> {
        self.read(|core| core.issues_found(group))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.verdict().is_valid()
    }

    #[must_use]
    pub fn do_not_save(&self) -> bool {
        self.verdict().do_not_save()
    }

    pub fn verdict(&self) -> ValidationVerdict {
        self.read(Core::verdict)
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        self.read(|core| core.value(name))
    }

    #[must_use]
    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        self.read(|core| core.field_state(name))
    }

    #[must_use]
    pub fn field_status(&self, name: &str) -> Option<ValidationStatus> {
        self.read(|core| core.field_status(name))
    }

    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        self.read(Core::snapshot)
    }

    #[must_use]
    pub fn configs(&self) -> Vec<Arc<FieldConfig>> {
        self.read(Core::configs)
    }

    /// A typed accessor for one field. The business-logic pseudo-field has
    /// none; read it through [`issues_found`](Self::issues_found).
    #[must_use]
    pub fn field<'a>(&'a self, name: &'a str) -> Option<FieldHandle<'a>> {
        let kind = self.read(|core| core.field_kind(name))?;
        FieldHandle::new(self, name, kind)
    }

    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        self.with_core(|core| core.set_enabled(name, enabled, false))
    }

    /// Change a validator's runtime overrides. They survive reconfiguration
    /// and take effect on the next validation.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name.
    pub fn set_validator_overrides(
        &self,
        name: &str,
        error_code: &str,
        changes: ValidatorOverrideChanges,
    ) -> Result<(), ConfigError> {
        self.with_core(|core| core.set_validator_overrides(name, error_code, changes))
    }

    /// Add or reconfigure fields. Running state is kept per [`MergeMode`];
    /// `initial_states` seed new or replaced fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] and leaves the manager unchanged if the
    /// resulting configuration does not compile.
    pub fn apply_config(
        &self,
        configs: Vec<FieldConfig>,
        mode: &MergeMode,
        initial_states: Vec<FieldState>,
    ) -> Result<(), ConfigError> {
        self.with_core(|core| core.apply_config(configs, mode, initial_states, false))
    }

    /// # Errors
    ///
    /// `FieldNotFound` for an unknown name.
    pub fn remove_field(&self, name: &str) -> Result<(), ConfigError> {
        self.with_core(|core| core.remove_field(name, false))
    }

    /// Cancel the pending verdict notification and silence every callback.
    /// Outstanding asynchronous results are discarded.
    pub fn dispose(&self) {
        let mut core = self.shared.core.borrow_mut();
        if let Some(handle) = core.debounce.take() {
            handle.cancel();
        }
        core.disposed = true;
        core.events.clear();
        debug!("validation manager disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.read(|core| core.disposed)
    }
}
