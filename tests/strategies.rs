#![allow(dead_code)]

use std::time::Duration;

use fieldcheck::{
    BusinessLogicError, CompareOp, ConditionDescriptor, FieldConfig, RuleConfig, Services,
    SetValueOptions, Severity, ValidationManager, Value,
};
use proptest::prelude::*;

// --- Fixed form schema ---
// Four property fields, each with a random subset of these rules:
//   Require        (code "Require")
//   Compare op n   (code "CMP")
//   StringLength   (code "LEN", max only)
//   CompareToField (code "CROSS", against another field of the form)

pub const FIELDS: &[&str] = &["a", "b", "c", "d"];
const OPS: &[CompareOp] = &[
    CompareOp::Eq,
    CompareOp::Neq,
    CompareOp::Gt,
    CompareOp::Gte,
    CompareOp::Lt,
    CompareOp::Lte,
];

fn arb_severity() -> impl Strategy<Value = Option<Severity>> {
    prop_oneof![
        Just(None),
        Just(Some(Severity::Warning)),
        Just(Some(Severity::Error)),
        Just(Some(Severity::Severe)),
    ]
}

/// A field value: missing, a small integer, or a short lowercase string.
pub fn arb_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        (-50_i64..50).prop_map(|n| Some(Value::Int(n))),
        "[a-z]{0,6}".prop_map(|s| Some(Value::String(s))),
    ]
}

fn with_severity(rule: RuleConfig, severity: Option<Severity>) -> RuleConfig {
    match severity {
        Some(s) => rule.severity(s),
        None => rule,
    }
}

fn arb_field(index: usize) -> impl Strategy<Value = FieldConfig> {
    (
        prop::sample::subsequence(vec![0_u8, 1, 2, 3], 0..=4),
        prop::sample::select(OPS),
        -50_i64..50,
        0_i64..6,
        1_usize..FIELDS.len(),
        prop::collection::vec(arb_severity(), 4),
    )
        .prop_map(move |(kinds, op, bound, max_len, offset, severities)| {
            let name = FIELDS[index];
            let other = FIELDS[(index + offset) % FIELDS.len()];
            kinds
                .into_iter()
                .fold(FieldConfig::property(name), |config, kind| {
                    let rule = match kind {
                        0 => RuleConfig::new(ConditionDescriptor::require()),
                        1 => RuleConfig::new(ConditionDescriptor::compare(op, bound)).code("CMP"),
                        2 => RuleConfig::new(ConditionDescriptor::string_length(None, Some(max_len)))
                            .code("LEN"),
                        _ => RuleConfig::new(ConditionDescriptor::compare_to_field(op, other))
                            .code("CROSS"),
                    };
                    config.rule(with_severity(rule, severities[usize::from(kind)]))
                })
        })
}

/// The four-field form with random rules.
pub fn arb_configs() -> impl Strategy<Value = Vec<FieldConfig>> {
    (arb_field(0), arb_field(1), arb_field(2), arb_field(3))
        .prop_map(|(a, b, c, d)| vec![a, b, c, d])
}

/// One value per field of the form.
pub fn arb_values() -> impl Strategy<Value = Vec<Option<Value>>> {
    prop::collection::vec(arb_value(), FIELDS.len())
}

/// Business-logic errors, some tied to a field and some not.
pub fn arb_business_logic_errors() -> impl Strategy<Value = Vec<BusinessLogicError>> {
    prop::collection::vec(
        (
            prop::option::of(prop::sample::select(FIELDS)),
            prop::option::of("[A-Z]{2,4}"),
            arb_severity(),
        )
            .prop_map(|(field, code, severity)| {
                let mut error = BusinessLogicError::new("rejected by server");
                error.field = field.map(str::to_owned);
                error.error_code = code;
                error.severity = severity;
                error
            }),
        0..4,
    )
}

/// Build a manager over `configs` that notifies synchronously.
pub fn manager(configs: Vec<FieldConfig>) -> ValidationManager {
    ValidationManager::builder(Services::default())
        .fields(configs)
        .notify_delay(Duration::ZERO)
        .build()
        .expect("generated configuration must compile")
}

/// Assign `values` to the form fields without validating.
pub fn fill(manager: &ValidationManager, values: &[Option<Value>]) {
    for (name, value) in FIELDS.iter().zip(values) {
        let _ = manager
            .set_value_with(name, value.clone(), SetValueOptions::default())
            .expect("form field must exist");
    }
}
