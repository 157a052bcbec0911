use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fieldcheck::{
    BusinessLogicError, CompareOp, Condition, ConditionDescriptor, ConditionError, ConditionResult, Evaluation,
    EvaluationTarget, FieldConfig, MergeMode, RemoveSet, RuleConfig, Services, Severity,
    ValidateOptions, ValidationManager, ValidationStatus, Value, ValueResolver,
    BUSINESS_LOGIC_FIELD,
};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts events at one level.
struct LevelCounter {
    level: Level,
    seen: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == self.level {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn count_events<R>(level: Level, f: impl FnOnce() -> R) -> (R, usize) {
    let seen = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(LevelCounter {
        level,
        seen: Arc::clone(&seen),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, seen.load(Ordering::SeqCst))
}

#[derive(Debug)]
struct Exploding;

impl Condition for Exploding {
    fn condition_type(&self) -> &str {
        "Exploding"
    }

    fn evaluate(
        &self,
        _target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        Err(ConditionError::new("Exploding", "lookup table missing"))
    }
}

fn build(fields: Vec<FieldConfig>) -> ValidationManager {
    ValidationManager::builder(Services::default())
        .fields(fields)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn missing_required_value_is_severe() {
    let manager = build(vec![
        FieldConfig::property("Age").validate_with(ConditionDescriptor::require())
    ]);

    let _ = manager.set_value_with("Age", None, Default::default()).unwrap();
    let pending = manager.validate(&ValidateOptions::default());

    assert_eq!(manager.field_status("Age"), Some(ValidationStatus::Invalid));
    let issues = pending.verdict().issues_found();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Severe);
    assert_eq!(issues[0].error_message, "Age requires a value.");
}

#[test]
fn confirm_password_is_corrected() {
    let manager = build(vec![
        FieldConfig::property("Password"),
        FieldConfig::property("ConfirmPassword")
            .label("Confirm password")
            .validate_with(ConditionDescriptor::equal_to("Password")),
    ]);

    let _ = manager.set_value("Password", "abc").unwrap();
    let _ = manager.set_value("ConfirmPassword", "xyz").unwrap();
    let pending = manager.validate(&ValidateOptions::default());
    let issues = pending.verdict().issues_found();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, "ConfirmPassword");
    assert_eq!(issues[0].error_code, "CompareToField");

    let _ = manager.set_value("ConfirmPassword", "abc").unwrap();
    let pending = manager
        .validate_field("ConfirmPassword", &ValidateOptions::default())
        .unwrap();
    let report = &pending.results()[0];
    assert!(report.issues_found().is_empty());
    assert!(report.corrected());
    assert!(manager.field_state("ConfirmPassword").unwrap().corrected);
    assert!(manager.issues_found(None).is_empty());
}

#[test]
fn business_logic_error_without_field() {
    let manager = build(vec![FieldConfig::property("Name")]);

    let blocking = manager.set_business_logic_error(BusinessLogicError::new("BL_ERROR"));
    assert!(blocking);
    assert!(!manager.is_valid());

    let issues = manager.issues_found(None);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, BUSINESS_LOGIC_FIELD);
    assert_eq!(issues[0].error_code, "GENERATED_0");
    assert_eq!(issues[0].error_message, "BL_ERROR");

    manager.clear_business_logic_errors(false);
    assert!(manager.is_valid());
    assert!(manager.field_state(BUSINESS_LOGIC_FIELD).is_none());
}

#[test]
fn failing_condition_degrades_to_undetermined() {
    let manager = build(vec![FieldConfig::property("Code")
        .initial_value("X1")
        .rule(RuleConfig::from_condition(Arc::new(Exploding)))]);

    let (pending, errors) = count_events(Level::ERROR, || {
        manager.validate(&ValidateOptions::default())
    });

    assert_eq!(errors, 1);
    let outcome = &pending.results()[0].outcomes()[0];
    assert_eq!(outcome.error_code, "Exploding");
    assert_eq!(outcome.condition_result, ConditionResult::Undetermined);
    assert!(outcome.issue_found.is_none());
    assert!(pending.verdict().is_valid());
    assert_eq!(manager.field_status("Code"), Some(ValidationStatus::Valid));
}

#[test]
fn merge_keeps_validator_omitted_later() {
    let manager = build(vec![FieldConfig::property("Age")]);

    manager
        .apply_config(
            vec![FieldConfig::property("Age").rule(
                RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 18_i64)).code("ADULT"),
            )],
            &MergeMode::Merge(RemoveSet::new()),
            Vec::new(),
        )
        .unwrap();
    manager
        .apply_config(
            vec![FieldConfig::property("Age").validate_with(ConditionDescriptor::require())],
            &MergeMode::Merge(RemoveSet::new()),
            Vec::new(),
        )
        .unwrap();

    let config = &manager.configs()[0];
    let codes: Vec<_> = config
        .rules
        .iter()
        .map(|r| {
            r.error_code
                .clone()
                .unwrap_or_else(|| r.condition.as_ref().unwrap().condition_type.clone())
        })
        .collect();
    assert_eq!(codes, ["ADULT", "Require"]);

    let _ = manager.set_value("Age", 12_i64).unwrap();
    let verdict = manager.validate(&ValidateOptions::default()).verdict().clone();
    assert_eq!(verdict.issues_found()[0].error_code, "ADULT");

    manager
        .apply_config(
            vec![FieldConfig::property("Age")],
            &MergeMode::Merge(RemoveSet::new().remove("Age", "ADULT")),
            Vec::new(),
        )
        .unwrap();
    assert_eq!(manager.configs()[0].rules.len(), 1);
    assert_eq!(manager.value("Age"), Some(Value::Int(12)));
}
