use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::notify::Event;
use crate::compile::{compile, CompiledField, BUSINESS_LOGIC_FIELD};
use crate::condition::ValueResolver;
use crate::merge::{plan, MergeMode};
use crate::scheduler::CancelHandle;
use crate::services::Services;
use crate::types::{
    BusinessLogicError, ConditionError, ConditionResult, ConfigError, FieldConfig, FieldKind,
    FieldRegistry, FieldState, IssueFound, ManagerSnapshot, ManagerState, MissingCodeBehavior,
    SetValueOptions, ValidateOptions, ValidationError, ValidationStatus, ValidationVerdict, Value,
    ValueHostValidateResult,
};
use crate::validator::{OverrideStore, ValidatorOverrideChanges};
use crate::value_host::{EvalEnv, PendingRule, ValueHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Field(usize),
    BusinessLogic,
}

/// Output of a validating operation before it is wrapped for the caller.
#[derive(Default)]
pub(crate) struct PassOutput {
    pub results: Vec<ValueHostValidateResult>,
    pub rules: Vec<PendingRule>,
}

impl PassOutput {
    fn absorb(&mut self, (report, rules): (Option<ValueHostValidateResult>, Vec<PendingRule>)) {
        self.results.extend(report);
        self.rules.extend(rules);
    }
}

/// Mutable manager state. Lives in a `RefCell`; every public operation
/// borrows it once, queues events, and releases it before callbacks run.
pub(crate) struct Core {
    pub services: Services,
    registry: FieldRegistry,
    hosts: Vec<ValueHost>,
    business_logic: Option<ValueHost>,
    manager_state: ManagerState,
    overrides: OverrideStore,
    /// States from a snapshot for fields that are not configured yet.
    saved_states: HashMap<String, FieldState>,
    pub notify_delay: Duration,
    pub debounce: Option<CancelHandle>,
    pub disposed: bool,
    pub events: Vec<Event>,
}

/// Read-only view handed to conditions and calculations.
struct View<'a> {
    core: &'a Core,
}

impl ValueResolver for View<'_> {
    fn value_of(&self, field: &str) -> Option<Value> {
        self.core.host(field)?.current_value(self)
    }

    fn label_of(&self, field: &str) -> Option<String> {
        self.core
            .host(field)
            .map(|h| h.config().display_label().to_owned())
    }

    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        self.core.services.comparer.compare(a, b)
    }
}

impl Core {
    pub fn new(services: Services, notify_delay: Duration, snapshot: Option<ManagerSnapshot>) -> Self {
        let mut core = Self {
            services,
            registry: FieldRegistry::new(),
            hosts: Vec::new(),
            business_logic: None,
            manager_state: ManagerState::default(),
            overrides: OverrideStore::default(),
            saved_states: HashMap::new(),
            notify_delay,
            debounce: None,
            disposed: false,
            events: Vec::new(),
        };
        if let Some(snapshot) = snapshot {
            core.manager_state = snapshot.manager_state;
            for state in snapshot.field_states {
                if state.name == BUSINESS_LOGIC_FIELD {
                    if !state.business_logic_errors.is_empty() {
                        core.business_logic =
                            Some(ValueHost::with_state(CompiledField::business_logic(), state));
                    }
                } else {
                    core.saved_states.insert(state.name.clone(), state);
                }
            }
        }
        core
    }

    fn host(&self, name: &str) -> Option<&ValueHost> {
        if name == BUSINESS_LOGIC_FIELD {
            return self.business_logic.as_ref();
        }
        self.registry.get(name).map(|slot| &self.hosts[slot])
    }

    fn slot(&self, name: &str) -> Result<usize, ConfigError> {
        self.registry.get(name).ok_or_else(|| ConfigError::FieldNotFound {
            name: name.to_owned(),
        })
    }

    fn host_mut(&mut self, target: Target) -> Option<&mut ValueHost> {
        match target {
            Target::Field(slot) => self.hosts.get_mut(slot),
            Target::BusinessLogic => self.business_logic.as_mut(),
        }
    }

    fn push(&mut self, skip_callbacks: bool, event: Event) {
        if !skip_callbacks {
            self.events.push(event);
        }
    }

    /// Run a host transition and queue a state-change event when the state
    /// actually differs afterwards.
    fn transition<R: Default>(
        &mut self,
        target: Target,
        skip_callbacks: bool,
        f: impl FnOnce(&mut ValueHost) -> R,
    ) -> R {
        let Some(host) = self.host_mut(target) else {
            return R::default();
        };
        let before = host.state().clone();
        let out = f(host);
        if *host.state() != before {
            let after = host.state().clone();
            self.push(skip_callbacks, Event::FieldState(after));
            self.push(skip_callbacks, Event::VerdictRequested);
        }
        out
    }

    fn matches_group(host: &ValueHost, group: Option<&str>) -> bool {
        group.map_or(true, |wanted| host.config().group.as_deref() == Some(wanted))
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        View { core: self }.value_of(name)
    }

    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        self.host(name).map(|h| h.state().clone())
    }

    pub fn field_status(&self, name: &str) -> Option<ValidationStatus> {
        self.host(name).map(ValueHost::status)
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.host(name).map(ValueHost::kind)
    }

    pub fn field_is_enabled(&self, name: &str) -> Option<bool> {
        self.host(name).map(ValueHost::is_enabled)
    }

    pub fn field_issues(&self, name: &str) -> Vec<IssueFound> {
        self.host(name).map(ValueHost::issues_found).unwrap_or_default()
    }

    pub fn label(&self, name: &str) -> Option<String> {
        View { core: self }.label_of(name)
    }

    pub fn configs(&self) -> Vec<Arc<FieldConfig>> {
        self.hosts.iter().map(|h| Arc::clone(h.config())).collect()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_owned).collect()
    }

    fn reporting_hosts(&self) -> impl Iterator<Item = &ValueHost> {
        self.hosts.iter().chain(self.business_logic.as_ref())
    }

    /// Issues ordered by field, the business-logic pseudo-field last. A
    /// group excludes the pseudo-field.
    pub fn issues_found(&self, group: Option<&str>) -> Vec<IssueFound> {
        match group {
            None => self.reporting_hosts().flat_map(ValueHost::issues_found).collect(),
            Some(_) => self
                .hosts
                .iter()
                .filter(|h| Self::matches_group(h, group))
                .flat_map(ValueHost::issues_found)
                .collect(),
        }
    }

    pub fn verdict(&self) -> ValidationVerdict {
        let issues = self.issues_found(None);
        let is_valid = !issues.iter().any(|i| i.severity.blocks_save());
        let do_not_save = !is_valid || self.reporting_hosts().any(ValueHost::do_not_save);
        let async_processing = self
            .reporting_hosts()
            .any(|h| h.is_enabled() && h.state().async_processing);
        ValidationVerdict::new(is_valid, do_not_save, issues, async_processing)
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            manager_state: self.manager_state,
            field_states: self
                .reporting_hosts()
                .map(|h| h.state().clone())
                .collect(),
        }
    }

    fn validate_target(
        &mut self,
        target: Target,
        options: &ValidateOptions,
    ) -> (Option<ValueHostValidateResult>, Vec<PendingRule>) {
        let run = {
            let host = match target {
                Target::Field(slot) => self.hosts.get(slot),
                Target::BusinessLogic => self.business_logic.as_ref(),
            };
            let Some(host) = host else {
                return (None, Vec::new());
            };
            let view = View { core: self };
            let env = EvalEnv {
                resolver: &view,
                services: &self.services,
                overrides: &self.overrides,
            };
            host.evaluate(options, &env)
        };
        self.transition(target, options.skip_callbacks, |h| h.apply(run))
    }

    fn can_validate(host: &ValueHost) -> bool {
        host.kind().is_validatable() && host.is_enabled()
    }

    pub fn validate(&mut self, options: &ValidateOptions) -> (ValidationVerdict, PassOutput) {
        let mut out = PassOutput::default();
        let group = options.group.as_deref();
        for slot in 0..self.hosts.len() {
            let host = &self.hosts[slot];
            if Self::can_validate(host) && Self::matches_group(host, group) {
                out.absorb(self.validate_target(Target::Field(slot), options));
            }
        }
        if group.is_none() && self.business_logic.is_some() {
            out.absorb(self.validate_target(Target::BusinessLogic, options));
        }
        let verdict = self.verdict();
        debug!(
            valid = verdict.is_valid(),
            issues = verdict.issues_found().len(),
            pending = out.rules.len(),
            "validation pass"
        );
        self.push(options.skip_callbacks, Event::Verdict(verdict.clone()));
        (verdict, out)
    }

    pub fn validate_field(&mut self, name: &str, options: &ValidateOptions) -> Result<PassOutput, ConfigError> {
        let slot = self.slot(name)?;
        let host = &self.hosts[slot];
        if !host.kind().is_validatable() {
            return Err(ConfigError::NotValidatable {
                name: name.to_owned(),
            });
        }
        let mut out = PassOutput::default();
        if host.is_enabled() {
            out.absorb(self.validate_target(Target::Field(slot), options));
        }
        Ok(out)
    }

    pub fn apply_async(
        &mut self,
        field: &str,
        error_code: &str,
        epoch: u64,
        result: Result<ConditionResult, ConditionError>,
        skip_callbacks: bool,
    ) -> Result<(), ValidationError> {
        let Some(slot) = self.registry.get(field) else {
            debug!(field, error_code, "asynchronous result for a removed field discarded");
            return Ok(());
        };
        if !self.hosts[slot].accepts(epoch, error_code) {
            debug!(field, error_code, "stale asynchronous result discarded");
            return Ok(());
        }
        match result {
            Ok(result) => {
                let outcome = {
                    let view = View { core: self };
                    let env = EvalEnv {
                        resolver: &view,
                        services: &self.services,
                        overrides: &self.overrides,
                    };
                    self.hosts[slot].outcome_for(error_code, result, &env)
                };
                self.transition(Target::Field(slot), skip_callbacks, |h| {
                    h.apply_async(error_code, outcome)
                });
                Ok(())
            }
            Err(source) => {
                error!(field, error_code, error = %source, "asynchronous condition rejected");
                self.transition(Target::Field(slot), skip_callbacks, |h| {
                    h.apply_async(error_code, None)
                });
                Err(ValidationError::AsyncCondition {
                    field: field.to_owned(),
                    error_code: error_code.to_owned(),
                    source,
                })
            }
        }
    }

    /// `name` plus every calculated field whose value follows from it.
    fn changed_closure(&self, name: &str) -> BTreeSet<String> {
        let mut changed = BTreeSet::from([name.to_owned()]);
        loop {
            let before = changed.len();
            for host in &self.hosts {
                if host.kind() == FieldKind::Calculated
                    && !changed.contains(host.name())
                    && host.dependencies().iter().any(|d| changed.contains(d))
                {
                    changed.insert(host.name().to_owned());
                }
            }
            if changed.len() == before {
                return changed;
            }
        }
    }

    /// Validate the changed field if asked, then re-validate or demote every
    /// field that has been validated before and reads a changed value.
    fn after_change(&mut self, slot: usize, options: SetValueOptions, propagate: bool) -> PassOutput {
        let mut out = PassOutput::default();
        let skip = options.skip_callbacks;
        if options.validate && Self::can_validate(&self.hosts[slot]) {
            let validate = ValidateOptions {
                during_edit: options.during_edit,
                skip_callbacks: skip,
                ..ValidateOptions::default()
            };
            out.absorb(self.validate_target(Target::Field(slot), &validate));
        }
        if !propagate {
            return out;
        }

        let changed = self.changed_closure(self.hosts[slot].name());
        let dependents: Vec<usize> = (0..self.hosts.len())
            .filter(|&other| other != slot)
            .filter(|&other| {
                let host = &self.hosts[other];
                Self::can_validate(host)
                    && host.has_validated()
                    && host.dependencies().iter().any(|d| changed.contains(d))
            })
            .collect();
        for other in dependents {
            if options.validate {
                let validate = ValidateOptions {
                    skip_callbacks: skip,
                    ..ValidateOptions::default()
                };
                out.absorb(self.validate_target(Target::Field(other), &validate));
            } else {
                self.transition(Target::Field(other), skip, ValueHost::demote);
            }
        }
        out
    }

    pub fn set_value(&mut self, name: &str, value: Option<Value>, options: SetValueOptions) -> Result<PassOutput, ConfigError> {
        let slot = self.slot(name)?;
        let kind = self.hosts[slot].kind();
        if kind == FieldKind::Calculated {
            return Err(ConfigError::Unsupported {
                name: name.to_owned(),
                kind,
                operation: "setting a value",
            });
        }
        let skip = options.skip_callbacks;
        let changed = self.transition(Target::Field(slot), skip, |h| h.set_value(value.clone()));
        if !changed {
            return Ok(PassOutput::default());
        }
        debug!(field = name, "value changed");
        self.push(
            skip,
            Event::Value {
                field: name.to_owned(),
                value,
            },
        );
        Ok(self.after_change(slot, options, true))
    }

    pub fn set_input_value(&mut self, name: &str, text: &str, options: SetValueOptions) -> Result<PassOutput, ConfigError> {
        let slot = self.slot(name)?;
        let kind = self.hosts[slot].kind();
        if kind != FieldKind::Input {
            return Err(ConfigError::Unsupported {
                name: name.to_owned(),
                kind,
                operation: "input text",
            });
        }
        let converted = self
            .services
            .converter
            .convert(text, self.hosts[slot].config().data_type.as_deref());
        if let Err(reason) = &converted {
            debug!(field = name, reason = %reason, "input text did not convert");
        }
        let skip = options.skip_callbacks;
        let (changed, value_changed) =
            self.transition(Target::Field(slot), skip, |h| h.set_input_value(text, converted));
        if !changed {
            return Ok(PassOutput::default());
        }
        if value_changed {
            let value = self.hosts[slot].stored_value().cloned();
            self.push(
                skip,
                Event::Value {
                    field: name.to_owned(),
                    value,
                },
            );
        }
        Ok(self.after_change(slot, options, value_changed))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool, skip_callbacks: bool) -> Result<(), ConfigError> {
        let slot = self.slot(name)?;
        self.transition(Target::Field(slot), skip_callbacks, |h| h.set_enabled(enabled));
        Ok(())
    }

    pub fn clear_validation(&mut self, options: &ValidateOptions) {
        let group = options.group.as_deref();
        for slot in 0..self.hosts.len() {
            if Self::matches_group(&self.hosts[slot], group) {
                self.transition(Target::Field(slot), options.skip_callbacks, |h| {
                    h.clear_validation(false)
                });
            }
        }
        if group.is_none() && self.business_logic.take().is_some() {
            self.push(options.skip_callbacks, Event::VerdictRequested);
        }
    }

    fn business_logic_target(&mut self) -> Target {
        if self.business_logic.is_none() {
            self.business_logic = Some(ValueHost::new(CompiledField::business_logic()));
        }
        Target::BusinessLogic
    }

    /// Route each error to its field, or to the pseudo-field when it names
    /// none. Returns whether any of them blocks saving.
    pub fn set_business_logic_errors(&mut self, errors: Vec<BusinessLogicError>, skip_callbacks: bool) -> bool {
        let mut blocking = false;
        for error in errors {
            let code = match &error.error_code {
                Some(code) => code.clone(),
                None => self.manager_state.next_generated_code(),
            };
            let slot = error.field.as_deref().and_then(|f| self.registry.get(f));
            let target = match (slot, error.field.as_deref()) {
                (Some(slot), _) if self.hosts[slot].kind().is_validatable() => Target::Field(slot),
                (_, Some(field)) if field != BUSINESS_LOGIC_FIELD => {
                    warn!(field, error_code = %code, "business-logic error for a field that cannot hold it");
                    self.business_logic_target()
                }
                _ => self.business_logic_target(),
            };
            let field = match target {
                Target::Field(slot) => self.hosts[slot].name().to_owned(),
                Target::BusinessLogic => BUSINESS_LOGIC_FIELD.to_owned(),
            };
            let issue = error.into_issue(&field, code);
            blocking |= issue.severity.blocks_save();
            self.transition(target, skip_callbacks, |h| h.set_business_logic_error(issue));
        }
        blocking
    }

    pub fn clear_business_logic_errors(&mut self, skip_callbacks: bool) {
        for slot in 0..self.hosts.len() {
            self.transition(Target::Field(slot), skip_callbacks, ValueHost::clear_business_logic_errors);
        }
        if self.business_logic.take().is_some() {
            self.push(skip_callbacks, Event::VerdictRequested);
        }
    }

    pub fn set_issues_found(&mut self, issues: Vec<IssueFound>, behavior: MissingCodeBehavior, skip_callbacks: bool) {
        let mut by_field: Vec<(String, Vec<IssueFound>)> = Vec::new();
        for issue in issues {
            match by_field.iter_mut().find(|(f, _)| *f == issue.field) {
                Some((_, list)) => list.push(issue),
                None => by_field.push((issue.field.clone(), vec![issue])),
            }
        }

        for (field, list) in by_field {
            if field == BUSINESS_LOGIC_FIELD {
                let target = self.business_logic_target();
                self.transition(target, skip_callbacks, |h| h.replace_business_logic_errors(list));
                continue;
            }
            let Some(slot) = self.registry.get(&field) else {
                warn!(field = %field, "issues for an unknown field ignored");
                continue;
            };
            let host = &self.hosts[slot];
            if !host.kind().is_validatable() {
                warn!(field = %field, "issues for a field without validation ignored");
                continue;
            }
            let kept: Vec<IssueFound> = list
                .into_iter()
                .filter(|i| behavior == MissingCodeBehavior::Keep || host.has_validator_code(&i.error_code))
                .collect();
            if kept.is_empty() {
                continue;
            }
            self.transition(Target::Field(slot), skip_callbacks, |h| h.replace_issues(kept));
        }
    }

    pub fn set_validator_overrides(
        &mut self,
        name: &str,
        error_code: &str,
        changes: ValidatorOverrideChanges,
    ) -> Result<(), ConfigError> {
        self.slot(name)?;
        self.overrides.apply(name, error_code, changes);
        Ok(())
    }

    pub fn apply_config(
        &mut self,
        configs: Vec<FieldConfig>,
        mode: &MergeMode,
        initial_states: Vec<FieldState>,
        skip_callbacks: bool,
    ) -> Result<(), ConfigError> {
        let mut initial: HashMap<String, FieldState> =
            initial_states.into_iter().map(|s| (s.name.clone(), s)).collect();
        let (registry, hosts) = (&self.registry, &self.hosts);
        let planned = plan(
            configs,
            mode,
            |name| registry.get(name).map(|slot| &hosts[slot]),
            &mut initial,
            &self.saved_states,
        );
        let (configs, states): (Vec<FieldConfig>, Vec<FieldState>) =
            planned.into_iter().map(|p| (p.config, p.state)).unzip();

        let existing = self.configs();
        let compiled = compile(&configs, &existing, &self.services)?;

        for (compiled, state) in compiled.into_iter().zip(states) {
            let name = compiled.config.name.clone();
            let host = ValueHost::with_state(compiled, state);
            match self.registry.get(&name) {
                Some(slot) => self.hosts[slot] = host,
                None => {
                    self.registry.register(&name);
                    self.hosts.push(host);
                }
            }
            self.saved_states.remove(&name);
        }
        debug!(fields = self.hosts.len(), "configuration committed");
        let all = self.configs();
        self.push(skip_callbacks, Event::Config(all));
        self.push(skip_callbacks, Event::VerdictRequested);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str, skip_callbacks: bool) -> Result<(), ConfigError> {
        let slot = self.slot(name)?;
        self.hosts.remove(slot);
        self.registry.remove(name);
        self.overrides.remove_field(name);
        let all = self.configs();
        self.push(skip_callbacks, Event::Config(all));
        self.push(skip_callbacks, Event::VerdictRequested);
        Ok(())
    }
}
