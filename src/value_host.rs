//! Per-field state machine.
//!
//! A [`ValueHost`] owns one field's [`FieldState`] and never edits it in
//! place: each transition clones the current state, changes the clone, and
//! swaps it in, reporting whether anything actually changed. Behavior that
//! differs by field kind is dispatched on [`FieldKind`].
//!
//! Validation happens in two steps so that conditions can read every other
//! field while this one is being validated: [`ValueHost::evaluate`] runs the
//! validators against a shared view of the manager, and
//! [`ValueHost::apply`] folds the outcomes into a new state.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::compile::CompiledField;
use crate::condition::{EvaluationTarget, ValueResolver};
use crate::services::Services;
use crate::types::{
    same_value, upsert_issue, ConditionError, ConditionResult, FieldConfig, FieldKind,
    FieldState, IssueFound, Severity, ValidateOptions, ValidationStatus, ValidatorOutcome, Value,
    ValueHostValidateResult,
};
use crate::validator::{OverrideStore, Validator, ValidatorContext, ValidatorRun};

/// An asynchronous validator still running for a host.
pub(crate) struct PendingRule {
    pub field: String,
    pub error_code: String,
    pub epoch: u64,
    pub future: BoxFuture<'static, Result<ConditionResult, ConditionError>>,
}

/// Output of [`ValueHost::evaluate`], consumed by [`ValueHost::apply`].
pub(crate) struct HostRun {
    outcomes: Vec<ValidatorOutcome>,
    pending: Vec<(String, BoxFuture<'static, Result<ConditionResult, ConditionError>>)>,
}

impl HostRun {
    fn ran(&self) -> bool {
        !self.outcomes.is_empty() || !self.pending.is_empty()
    }
}

/// Shared read access used while validators run.
pub(crate) struct EvalEnv<'a> {
    pub resolver: &'a dyn ValueResolver,
    pub services: &'a Services,
    pub overrides: &'a OverrideStore,
}

#[derive(Debug)]
pub(crate) struct ValueHost {
    compiled: CompiledField,
    state: FieldState,
    /// Bumped by every value change and validation pass; async results
    /// carrying an older epoch are stale.
    epoch: u64,
    pending: BTreeSet<String>,
    /// Set by value changes and demotion, cleared by validation.
    needs_validation: bool,
}

impl ValueHost {
    /// A host with a default state for its configuration.
    pub fn new(compiled: CompiledField) -> Self {
        let state = Self::initial_state(&compiled.config);
        Self::with_state(compiled, state)
    }

    /// A host resuming a previously captured state.
    pub fn with_state(compiled: CompiledField, mut state: FieldState) -> Self {
        state.name.clone_from(&compiled.config.name);
        // No future survives a restore; the field has to be validated again.
        if state.async_processing {
            state.async_processing = false;
            state.status = ValidationStatus::NeedsValidation;
        }
        let needs_validation = state.status == ValidationStatus::NeedsValidation;
        Self {
            compiled,
            state,
            epoch: 0,
            pending: BTreeSet::new(),
            needs_validation,
        }
    }

    pub fn initial_state(config: &FieldConfig) -> FieldState {
        let mut state = FieldState::new(config.name.clone());
        state.value.clone_from(&config.initial_value);
        if config.kind == FieldKind::Input {
            state.input_value = config.initial_value.as_ref().map(ToString::to_string);
        }
        state
    }

    pub fn name(&self) -> &str {
        &self.compiled.config.name
    }

    pub fn kind(&self) -> FieldKind {
        self.compiled.config.kind
    }

    pub fn config(&self) -> &Arc<FieldConfig> {
        &self.compiled.config
    }

    pub fn validator(&self, error_code: &str) -> Option<&Validator> {
        self.compiled
            .validators
            .iter()
            .find(|v| v.error_code() == error_code)
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.compiled.dependencies
    }

    pub fn state(&self) -> &FieldState {
        &self.state
    }

    pub fn stored_value(&self) -> Option<&Value> {
        self.state.value.as_ref()
    }

    /// Value as other fields see it; calculated fields compute theirs.
    pub fn current_value(&self, resolver: &dyn ValueResolver) -> Option<Value> {
        match (&self.compiled.config.calculation, self.kind()) {
            (Some(calculation), FieldKind::Calculated) => calculation.compute(resolver),
            _ => self.state.value.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state
            .enabled
            .unwrap_or(self.compiled.config.initial_enabled)
    }

    pub fn status(&self) -> ValidationStatus {
        if self.is_enabled() {
            self.state.status
        } else {
            ValidationStatus::Disabled
        }
    }

    pub fn do_not_save(&self) -> bool {
        self.is_enabled()
            && (matches!(
                self.state.status,
                ValidationStatus::Invalid | ValidationStatus::NeedsValidation
            ) || self.state.async_processing)
    }

    /// Issues reported to callers; none while disabled.
    pub fn issues_found(&self) -> Vec<IssueFound> {
        if self.is_enabled() {
            self.state.merged_issues()
        } else {
            Vec::new()
        }
    }

    /// Whether this host completed a validation since it was last cleared.
    pub fn has_validated(&self) -> bool {
        self.state.last_outcome.is_some()
    }

    pub fn has_validator_code(&self, error_code: &str) -> bool {
        self.validator(error_code).is_some()
    }

    fn commit(&mut self, next: FieldState) -> bool {
        if next == self.state {
            return false;
        }
        self.state = next;
        true
    }

    fn reset_runtime(&mut self, needs_validation: bool) {
        self.epoch += 1;
        self.pending.clear();
        self.needs_validation = needs_validation;
    }

    /// Status after validation: invalid on any blocking issue, undetermined
    /// while async validators run, valid otherwise.
    fn settle(&self, next: &mut FieldState) {
        let status = if next.has_blocking_issue() {
            ValidationStatus::Invalid
        } else if next.async_processing {
            ValidationStatus::Undetermined
        } else {
            ValidationStatus::Valid
        };
        next.corrected = status == ValidationStatus::Valid
            && (next.last_outcome == Some(ValidationStatus::Invalid) || next.corrected);
        next.last_outcome = if next.async_processing {
            next.last_outcome.or(Some(ValidationStatus::Undetermined))
        } else {
            Some(status)
        };
        next.status = status;
    }

    /// Status once business-logic errors no longer force `Invalid`.
    fn resting_status(&self, next: &FieldState) -> ValidationStatus {
        if next.has_blocking_issue() {
            ValidationStatus::Invalid
        } else if self.needs_validation {
            ValidationStatus::NeedsValidation
        } else if next.async_processing {
            ValidationStatus::Undetermined
        } else if next.last_outcome.is_some() {
            ValidationStatus::Valid
        } else {
            ValidationStatus::NotAttempted
        }
    }

    fn changed_value_state(&self) -> FieldState {
        let mut next = self.state.clone();
        next.issues_found.clear();
        next.business_logic_errors.clear();
        next.async_processing = false;
        next.corrected = false;
        if self.kind().is_validatable() {
            next.status = ValidationStatus::NeedsValidation;
        }
        next
    }

    /// Set a native value. Returns `false` when the value is deep-equal to
    /// the current one, in which case nothing changes.
    pub fn set_value(&mut self, value: Option<Value>) -> bool {
        if same_value(self.state.value.as_ref(), value.as_ref()) {
            return false;
        }
        let mut next = self.changed_value_state();
        if self.kind() == FieldKind::Input {
            next.input_value = value.as_ref().map(ToString::to_string);
            next.conversion_error = None;
        }
        next.value = value;
        self.reset_runtime(self.kind().is_validatable());
        self.commit(next)
    }

    /// Set the raw text of an input field along with its conversion.
    /// Returns whether the native value changed.
    pub fn set_input_value(&mut self, text: &str, converted: Result<Option<Value>, String>) -> (bool, bool) {
        let (value, conversion_error) = match converted {
            Ok(value) => (value, None),
            Err(reason) => (None, Some(reason)),
        };
        if self.state.input_value.as_deref() == Some(text)
            && self.state.conversion_error == conversion_error
            && same_value(self.state.value.as_ref(), value.as_ref())
        {
            return (false, false);
        }
        let value_changed = !same_value(self.state.value.as_ref(), value.as_ref());
        let mut next = self.changed_value_state();
        next.input_value = Some(text.to_owned());
        next.conversion_error = conversion_error;
        next.value = value;
        self.reset_runtime(true);
        (self.commit(next), value_changed)
    }

    fn target<'a>(&'a self, value: Option<&'a Value>) -> EvaluationTarget<'a> {
        EvaluationTarget {
            field: self.name(),
            value,
            input_value: self.state.input_value.as_deref(),
            conversion_error: self.state.conversion_error.as_deref(),
        }
    }

    /// Run every validator against the current state without changing it.
    pub fn evaluate(&self, options: &ValidateOptions, env: &EvalEnv<'_>) -> HostRun {
        let ctx = ValidatorContext {
            target: self.target(self.state.value.as_ref()),
            label: self.compiled.config.display_label(),
            resolver: env.resolver,
            services: env.services,
            overrides: env.overrides,
        };
        let mut run = HostRun {
            outcomes: Vec::new(),
            pending: Vec::new(),
        };
        for validator in &self.compiled.validators {
            match validator.validate(&ctx, options) {
                ValidatorRun::Skipped => {}
                ValidatorRun::Settled(outcome) => run.outcomes.push(outcome),
                ValidatorRun::Pending(future) => {
                    run.pending.push((validator.error_code().to_owned(), future));
                }
            }
        }
        run
    }

    /// Fold a validation pass into a new state. Returns the report (or
    /// `None` when nothing ran and no business-logic errors exist), and the
    /// validators still running.
    pub fn apply(&mut self, run: HostRun) -> (Option<ValueHostValidateResult>, Vec<PendingRule>) {
        let ran = run.ran();
        self.reset_runtime(false);

        let mut next = self.state.clone();
        next.issues_found.clear();
        for issue in run.outcomes.iter().filter_map(|o| o.issue_found.clone()) {
            upsert_issue(&mut next.issues_found, issue);
        }
        self.pending = run.pending.iter().map(|(code, _)| code.clone()).collect();
        next.async_processing = !self.pending.is_empty();
        self.settle(&mut next);

        let report = (ran || !next.business_logic_errors.is_empty()).then(|| {
            ValueHostValidateResult::new(
                self.name().to_owned(),
                next.status,
                next.merged_issues(),
                run.outcomes,
                next.corrected,
                next.async_processing,
            )
        });
        let pending = run
            .pending
            .into_iter()
            .map(|(error_code, future)| PendingRule {
                field: self.name().to_owned(),
                error_code,
                epoch: self.epoch,
                future,
            })
            .collect();
        self.commit(next);
        (report, pending)
    }

    /// Whether an async result for `error_code` started at `epoch` still
    /// applies.
    pub fn accepts(&self, epoch: u64, error_code: &str) -> bool {
        epoch == self.epoch && self.pending.contains(error_code)
    }

    /// Render the outcome of a finished async validator against the
    /// current state.
    pub fn outcome_for(&self, error_code: &str, result: ConditionResult, env: &EvalEnv<'_>) -> Option<ValidatorOutcome> {
        let validator = self.validator(error_code)?;
        let value = self.state.value.as_ref();
        let ctx = ValidatorContext {
            target: self.target(value),
            label: self.compiled.config.display_label(),
            resolver: env.resolver,
            services: env.services,
            overrides: env.overrides,
        };
        Some(validator.outcome(result, &ctx))
    }

    /// Apply a finished async validator. `None` means the condition was
    /// rejected; the rule is dropped from the pending set without an issue.
    pub fn apply_async(&mut self, error_code: &str, outcome: Option<ValidatorOutcome>) -> bool {
        self.pending.remove(error_code);
        let mut next = self.state.clone();
        next.issues_found.retain(|i| i.error_code != error_code);
        if let Some(issue) = outcome.and_then(|o| o.issue_found) {
            upsert_issue(&mut next.issues_found, issue);
        }
        next.async_processing = !self.pending.is_empty();
        self.settle(&mut next);
        self.commit(next)
    }

    /// Back to `NotAttempted` with no issues. Business-logic errors are
    /// dropped unless `keep_business_logic` is set.
    pub fn clear_validation(&mut self, keep_business_logic: bool) -> bool {
        self.reset_runtime(false);
        let mut next = self.state.clone();
        next.issues_found.clear();
        if !keep_business_logic {
            next.business_logic_errors.clear();
        }
        next.async_processing = false;
        next.corrected = false;
        next.last_outcome = None;
        next.status = ValidationStatus::NotAttempted;
        self.commit(next)
    }

    /// React to a field this host depends on having changed, without
    /// re-validating now.
    pub fn demote(&mut self) -> bool {
        self.reset_runtime(true);
        let mut next = self.state.clone();
        next.issues_found.clear();
        next.async_processing = false;
        next.corrected = false;
        next.status = if next.has_blocking_business_logic_error() {
            ValidationStatus::Invalid
        } else {
            ValidationStatus::NeedsValidation
        };
        self.commit(next)
    }

    pub fn set_business_logic_error(&mut self, issue: IssueFound) -> bool {
        let mut next = self.state.clone();
        let blocking = issue.severity != Severity::Warning;
        upsert_issue(&mut next.business_logic_errors, issue);
        if blocking {
            next.status = ValidationStatus::Invalid;
            next.corrected = false;
        } else if next.status == ValidationStatus::Invalid {
            // A warning may take over the code of the only blocking issue.
            next.status = self.resting_status(&next);
        }
        self.commit(next)
    }

    pub fn clear_business_logic_errors(&mut self) -> bool {
        if self.state.business_logic_errors.is_empty() {
            return false;
        }
        let mut next = self.state.clone();
        next.business_logic_errors.clear();
        if next.status == ValidationStatus::Invalid {
            next.status = self.resting_status(&next);
        }
        self.commit(next)
    }

    /// Replace the rule issues wholesale, as if a validation pass had
    /// produced them.
    pub fn replace_issues(&mut self, issues: Vec<IssueFound>) -> bool {
        self.reset_runtime(false);
        let mut next = self.state.clone();
        next.issues_found.clear();
        for issue in issues {
            upsert_issue(&mut next.issues_found, issue);
        }
        next.async_processing = false;
        self.settle(&mut next);
        self.commit(next)
    }

    /// Business-logic errors replaced wholesale; used by the pseudo-field.
    pub fn replace_business_logic_errors(&mut self, issues: Vec<IssueFound>) -> bool {
        let mut next = self.state.clone();
        next.business_logic_errors.clear();
        for issue in issues {
            upsert_issue(&mut next.business_logic_errors, issue);
        }
        next.status = if next.has_blocking_business_logic_error() {
            ValidationStatus::Invalid
        } else {
            self.resting_status(&next)
        };
        self.commit(next)
    }

    /// Disabling clears validation but keeps business-logic errors for when
    /// the field comes back.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.is_enabled() == enabled {
            return false;
        }
        if !enabled {
            self.clear_validation(true);
        }
        let mut next = self.state.clone();
        next.enabled = Some(enabled);
        if enabled {
            next.status = if next.has_blocking_business_logic_error() {
                ValidationStatus::Invalid
            } else {
                ValidationStatus::NotAttempted
            };
        }
        self.commit(next)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures::executor::block_on;

    use super::*;
    use crate::compile::compile;
    use crate::condition::{Condition, Evaluation};
    use crate::types::{ConditionDescriptor, RuleConfig};

    #[derive(Default)]
    struct Fields(HashMap<String, Value>);

    impl ValueResolver for Fields {
        fn value_of(&self, field: &str) -> Option<Value> {
            self.0.get(field).cloned()
        }

        fn label_of(&self, field: &str) -> Option<String> {
            Some(field.to_owned())
        }
    }

    #[derive(Debug)]
    struct Remote(ConditionResult);

    impl Condition for Remote {
        fn condition_type(&self) -> &str {
            "Remote"
        }

        fn evaluate(
            &self,
            _target: &EvaluationTarget<'_>,
            _resolver: &dyn ValueResolver,
        ) -> Result<Evaluation, ConditionError> {
            let r = self.0;
            Ok(Evaluation::deferred(async move { Ok(r) }))
        }
    }

    fn host(config: FieldConfig) -> ValueHost {
        let mut compiled = compile(&[config], &[], &Services::default()).unwrap();
        ValueHost::new(compiled.remove(0))
    }

    fn validate(host: &mut ValueHost) -> (Option<ValueHostValidateResult>, Vec<PendingRule>) {
        let services = Services::default();
        let overrides = OverrideStore::default();
        let fields = Fields::default();
        let env = EvalEnv {
            resolver: &fields,
            services: &services,
            overrides: &overrides,
        };
        let run = host.evaluate(&ValidateOptions::default(), &env);
        host.apply(run)
    }

    fn required(name: &str) -> FieldConfig {
        FieldConfig::property(name).validate_with(ConditionDescriptor::require())
    }

    #[test]
    fn missing_required_value_is_invalid() {
        let mut h = host(required("Age"));
        let (report, pending) = validate(&mut h);
        let report = report.unwrap();
        assert!(pending.is_empty());
        assert_eq!(report.status(), ValidationStatus::Invalid);
        assert_eq!(report.issues_found()[0].severity, Severity::Severe);
        assert_eq!(h.status(), ValidationStatus::Invalid);
        assert!(h.do_not_save());
    }

    #[test]
    fn same_value_is_not_a_change() {
        let mut h = host(required("Age"));
        assert!(h.set_value(Some(Value::Int(3))));
        assert_eq!(h.status(), ValidationStatus::NeedsValidation);
        assert!(h.do_not_save());
        assert!(!h.set_value(Some(Value::Int(3))));
    }

    #[test]
    fn nothing_to_check_returns_no_report() {
        let mut h = host(FieldConfig::property("Notes"));
        let (report, _) = validate(&mut h);
        assert!(report.is_none());
        assert_eq!(h.status(), ValidationStatus::Valid);
    }

    #[test]
    fn fix_marks_corrected() {
        let mut h = host(required("Age"));
        let _ = validate(&mut h);
        assert!(!h.state().corrected);
        h.set_value(Some(Value::Int(1)));
        let (report, _) = validate(&mut h);
        assert!(report.unwrap().corrected());
        assert!(h.state().corrected);
        // Still corrected when validated again unchanged.
        let _ = validate(&mut h);
        assert!(h.state().corrected);
        h.clear_validation(false);
        assert!(!h.state().corrected);
        assert_eq!(h.status(), ValidationStatus::NotAttempted);
    }

    #[test]
    fn async_rule_leaves_field_undetermined_until_applied() {
        let mut h = host(FieldConfig::property("Email").rule(RuleConfig::from_condition(Arc::new(
            Remote(ConditionResult::NoMatch),
        ))));
        h.set_value(Some(Value::from("a@b")));
        let (report, mut pending) = validate(&mut h);
        assert!(report.unwrap().pending());
        assert_eq!(h.status(), ValidationStatus::Undetermined);
        assert!(h.do_not_save());

        let rule = pending.remove(0);
        assert!(h.accepts(rule.epoch, &rule.error_code));
        let result = block_on(rule.future).unwrap();
        let services = Services::default();
        let overrides = OverrideStore::default();
        let fields = Fields::default();
        let env = EvalEnv {
            resolver: &fields,
            services: &services,
            overrides: &overrides,
        };
        let outcome = h.outcome_for(&rule.error_code, result, &env);
        assert!(h.apply_async(&rule.error_code, outcome));
        assert_eq!(h.status(), ValidationStatus::Invalid);
        assert!(!h.state().async_processing);
    }

    #[test]
    fn newer_pass_makes_async_result_stale() {
        let mut h = host(FieldConfig::property("Email").rule(RuleConfig::from_condition(Arc::new(
            Remote(ConditionResult::Match),
        ))));
        let (_, pending) = validate(&mut h);
        let epoch = pending[0].epoch;
        h.set_value(Some(Value::from("x")));
        assert!(!h.accepts(epoch, "Remote"));
    }

    #[test]
    fn business_logic_errors_force_invalid_and_survive_demotion() {
        let mut h = host(required("Age"));
        h.set_value(Some(Value::Int(1)));
        let _ = validate(&mut h);
        assert_eq!(h.status(), ValidationStatus::Valid);

        h.set_business_logic_error(IssueFound::new("Age", "SRV", Severity::Error, "server says no"));
        assert_eq!(h.status(), ValidationStatus::Invalid);
        assert!(h.demote());
        assert_eq!(h.status(), ValidationStatus::Invalid);
        assert_eq!(h.issues_found().len(), 1);

        assert!(h.clear_business_logic_errors());
        assert_eq!(h.status(), ValidationStatus::NeedsValidation);
    }

    #[test]
    fn warning_business_logic_error_does_not_invalidate() {
        let mut h = host(required("Age"));
        h.set_value(Some(Value::Int(1)));
        let _ = validate(&mut h);
        h.set_business_logic_error(IssueFound::new("Age", "W", Severity::Warning, "hmm"));
        assert_eq!(h.status(), ValidationStatus::Valid);
        assert_eq!(h.issues_found().len(), 1);
    }

    #[test]
    fn set_value_clears_business_logic_errors() {
        let mut h = host(required("Age"));
        h.set_business_logic_error(IssueFound::new("Age", "SRV", Severity::Error, "no"));
        h.set_value(Some(Value::Int(4)));
        assert!(h.state().business_logic_errors.is_empty());
        assert_eq!(h.status(), ValidationStatus::NeedsValidation);
    }

    #[test]
    fn disabled_field_reports_nothing_but_keeps_business_logic() {
        let mut h = host(required("Age"));
        let _ = validate(&mut h);
        h.set_business_logic_error(IssueFound::new("Age", "SRV", Severity::Error, "no"));
        assert!(h.set_enabled(false));
        assert_eq!(h.status(), ValidationStatus::Disabled);
        assert!(!h.do_not_save());
        assert!(h.issues_found().is_empty());
        assert_eq!(h.state().business_logic_errors.len(), 1);

        assert!(h.set_enabled(true));
        assert_eq!(h.status(), ValidationStatus::Invalid);
        assert_eq!(h.issues_found().len(), 1);
    }

    #[test]
    fn input_conversion_failure_reports_type_check() {
        let mut h = host(FieldConfig::input("Age").data_type("integer"));
        let converted = Services::default().converter.convert("abc", Some("integer"));
        let (changed, value_changed) = h.set_input_value("abc", converted);
        assert!(changed);
        assert!(!value_changed);
        let (report, _) = validate(&mut h);
        let report = report.unwrap();
        assert_eq!(report.issues_found()[0].error_code, "DataTypeCheck");
        assert_eq!(report.issues_found()[0].severity, Severity::Severe);
    }

    #[test]
    fn restore_drops_in_flight_async() {
        let mut compiled = compile(&[required("Age")], &[], &Services::default()).unwrap();
        let state = FieldState {
            async_processing: true,
            status: ValidationStatus::Undetermined,
            ..FieldState::new("Age")
        };
        let h = ValueHost::with_state(compiled.remove(0), state);
        assert_eq!(h.status(), ValidationStatus::NeedsValidation);
        assert!(!h.state().async_processing);
    }
}
