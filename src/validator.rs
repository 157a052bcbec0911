//! One rule bound to one field.
//!
//! A [`Validator`] decides whether its condition runs at all and turns a
//! `NoMatch` into an [`IssueFound`]. The decision short-circuits in this
//! order:
//!
//! 1. a preliminary pass skips required-type rules;
//! 2. an edit-time pass skips conditions without edit-time support;
//! 3. a disabled rule (literal, computed or overridden) is skipped;
//! 4. an enabler that does not match skips the rule;
//! 5. otherwise the condition runs.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::condition::{Condition, ConditionCategory, Evaluation, EvaluationTarget, ValueResolver};
use crate::services::Services;
use crate::types::{
    ConditionError, ConditionResult, DynamicContext, IssueFound, RuleConfig, Severity,
    ValidateOptions, ValidatorOutcome,
};

/// A change to one overridable validator property.
///
/// `Unchanged` leaves any existing override alone, `Revert` drops it so the
/// configured value applies again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OverrideChange<T> {
    #[default]
    Unchanged,
    Revert,
    Set(T),
}

impl<T> OverrideChange<T> {
    fn apply(self, slot: &mut Option<T>) {
        match self {
            OverrideChange::Unchanged => {}
            OverrideChange::Revert => *slot = None,
            OverrideChange::Set(v) => *slot = Some(v),
        }
    }
}

/// Changes to the runtime overrides of one validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorOverrideChanges {
    pub enabled: OverrideChange<bool>,
    pub severity: OverrideChange<Severity>,
    pub error_message: OverrideChange<String>,
    pub summary_message: OverrideChange<String>,
}

/// Active overrides of one validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorOverride {
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
    pub error_message: Option<String>,
    pub summary_message: Option<String>,
}

impl ValidatorOverride {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Override store keyed by field and error code. Outlives host rebuilds.
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    entries: HashMap<(String, String), ValidatorOverride>,
}

impl OverrideStore {
    pub fn apply(&mut self, field: &str, error_code: &str, changes: ValidatorOverrideChanges) {
        let key = (field.to_owned(), error_code.to_owned());
        let entry = self.entries.entry(key.clone()).or_default();
        changes.enabled.apply(&mut entry.enabled);
        changes.severity.apply(&mut entry.severity);
        changes.error_message.apply(&mut entry.error_message);
        changes.summary_message.apply(&mut entry.summary_message);
        if entry.is_empty() {
            self.entries.remove(&key);
        }
    }

    #[must_use]
    pub fn get(&self, field: &str, error_code: &str) -> Option<&ValidatorOverride> {
        self.entries
            .get(&(field.to_owned(), error_code.to_owned()))
    }

    pub fn remove_field(&mut self, field: &str) {
        self.entries.retain(|(f, _), _| f != field);
    }
}

/// Everything a validator reads while deciding and rendering.
pub(crate) struct ValidatorContext<'a> {
    pub target: EvaluationTarget<'a>,
    pub label: &'a str,
    pub resolver: &'a dyn ValueResolver,
    pub services: &'a Services,
    pub overrides: &'a OverrideStore,
}

impl ValidatorContext<'_> {
    fn dynamic(&self) -> DynamicContext<'_> {
        DynamicContext {
            field: self.target.field,
            value: self.target.value,
            resolver: self.resolver,
        }
    }
}

/// The result of running one validator.
pub(crate) enum ValidatorRun {
    Skipped,
    Settled(ValidatorOutcome),
    Pending(BoxFuture<'static, Result<ConditionResult, ConditionError>>),
}

#[derive(Debug, Clone)]
pub struct Validator {
    error_code: String,
    condition: Arc<dyn Condition>,
    enabler: Option<Arc<dyn Condition>>,
    rule: RuleConfig,
}

impl Validator {
    pub(crate) fn new(
        error_code: String,
        condition: Arc<dyn Condition>,
        enabler: Option<Arc<dyn Condition>>,
        rule: RuleConfig,
    ) -> Self {
        Self {
            error_code,
            condition,
            enabler,
            rule,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    #[must_use]
    pub fn category(&self) -> ConditionCategory {
        self.condition.category()
    }

    /// Fields read by the condition or its enabler.
    pub fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        self.condition.gather_field_names(out);
        if let Some(enabler) = &self.enabler {
            enabler.gather_field_names(out);
        }
    }

    pub(crate) fn validate(&self, ctx: &ValidatorContext<'_>, options: &ValidateOptions) -> ValidatorRun {
        if options.preliminary && self.category() == ConditionCategory::Required {
            return ValidatorRun::Skipped;
        }
        if options.during_edit && !self.condition.supports_during_edit() {
            return ValidatorRun::Skipped;
        }
        if !self.is_enabled(ctx) {
            return ValidatorRun::Skipped;
        }
        if !self.enabler_allows(ctx) {
            return ValidatorRun::Skipped;
        }

        let evaluation = if options.during_edit {
            let text = ctx.target.input_value.map_or_else(
                || Cow::Owned(ctx.target.value.map(ToString::to_string).unwrap_or_default()),
                Cow::Borrowed,
            );
            self.condition
                .evaluate_during_edit(&text, &ctx.target, ctx.resolver)
        } else {
            self.condition.evaluate(&ctx.target, ctx.resolver)
        };

        match evaluation {
            Ok(Evaluation::Ready(result)) => ValidatorRun::Settled(self.outcome(result, ctx)),
            Ok(Evaluation::Deferred(fut)) => ValidatorRun::Pending(fut),
            Err(err) => {
                error!(
                    field = ctx.target.field,
                    error_code = %self.error_code,
                    error = %err,
                    "condition evaluation failed"
                );
                ValidatorRun::Settled(self.outcome(ConditionResult::Undetermined, ctx))
            }
        }
    }

    fn is_enabled(&self, ctx: &ValidatorContext<'_>) -> bool {
        self.override_for(ctx)
            .and_then(|o| o.enabled)
            .unwrap_or_else(|| self.rule.enabled.resolve(&ctx.dynamic()))
    }

    fn enabler_allows(&self, ctx: &ValidatorContext<'_>) -> bool {
        let Some(enabler) = &self.enabler else {
            return true;
        };
        match enabler.evaluate(&ctx.target, ctx.resolver) {
            Ok(Evaluation::Ready(result)) => result == ConditionResult::Match,
            Ok(Evaluation::Deferred(_)) => {
                debug!(
                    field = ctx.target.field,
                    error_code = %self.error_code,
                    "asynchronous enabler treated as undetermined"
                );
                false
            }
            Err(err) => {
                error!(
                    field = ctx.target.field,
                    error_code = %self.error_code,
                    error = %err,
                    "enabler evaluation failed"
                );
                false
            }
        }
    }

    fn override_for<'a>(&self, ctx: &ValidatorContext<'a>) -> Option<&'a ValidatorOverride> {
        ctx.overrides.get(ctx.target.field, &self.error_code)
    }

    /// Map a condition result to an outcome, rendering an issue on `NoMatch`.
    pub(crate) fn outcome(&self, result: ConditionResult, ctx: &ValidatorContext<'_>) -> ValidatorOutcome {
        let issue_found = (result == ConditionResult::NoMatch).then(|| self.render_issue(ctx));
        ValidatorOutcome {
            error_code: self.error_code.clone(),
            condition_result: result,
            issue_found,
        }
    }

    fn severity(&self, ctx: &ValidatorContext<'_>) -> Severity {
        if let Some(severity) = self.override_for(ctx).and_then(|o| o.severity) {
            return severity;
        }
        if let Some(severity) = &self.rule.severity {
            return severity.resolve(&ctx.dynamic());
        }
        match self.category() {
            ConditionCategory::Required | ConditionCategory::DataTypeCheck => Severity::Severe,
            _ => Severity::Error,
        }
    }

    fn tokens(&self, ctx: &ValidatorContext<'_>) -> Vec<(String, String)> {
        let mut tokens = vec![
            ("Label".to_owned(), ctx.label.to_owned()),
            (
                "Value".to_owned(),
                ctx.target.value.map(ToString::to_string).unwrap_or_default(),
            ),
        ];
        if let Some(reason) = ctx.target.conversion_error {
            tokens.push(("ConversionError".to_owned(), reason.to_owned()));
        }
        tokens.extend(self.condition.message_tokens(ctx.resolver));
        tokens
    }

    fn render_issue(&self, ctx: &ValidatorContext<'_>) -> IssueFound {
        let over = self.override_for(ctx);
        let dynamic = ctx.dynamic();
        let localize = |key: &Option<String>| {
            key.as_deref()
                .and_then(|k| ctx.services.localizer.localize(k, &ctx.services.culture))
        };

        let message = over
            .and_then(|o| o.error_message.clone())
            .or_else(|| localize(&self.rule.error_message_key))
            .or_else(|| self.rule.error_message.as_ref().map(|m| m.resolve(&dynamic)))
            .unwrap_or_else(|| self.fallback_message().to_owned());
        let summary = over
            .and_then(|o| o.summary_message.clone())
            .or_else(|| localize(&self.rule.summary_message_key))
            .or_else(|| self.rule.summary_message.as_ref().map(|m| m.resolve(&dynamic)));

        let tokens = self.tokens(ctx);
        let formatter = &ctx.services.message_formatter;
        IssueFound {
            field: ctx.target.field.to_owned(),
            error_code: self.error_code.clone(),
            severity: self.severity(ctx),
            error_message: formatter.format(&message, &tokens),
            summary_message: summary.map(|s| formatter.format(&s, &tokens)),
        }
    }

    fn fallback_message(&self) -> &'static str {
        match self.category() {
            ConditionCategory::Required => "{Label} requires a value.",
            ConditionCategory::DataTypeCheck => "{Label}: {ConversionError}",
            _ => "{Label} is invalid.",
        }
    }
}
