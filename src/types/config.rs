use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::status::Severity;
use super::value::{CompareOp, Value};
use crate::condition::{Condition, ValueResolver};

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Holds a value, has no rules.
    Static,
    /// Value computed from other fields; has no rules.
    Calculated,
    /// Holds a native value and validates it.
    Property,
    /// Like `Property`, plus the raw text being edited and its conversion.
    Input,
    /// The pseudo-field collecting business-logic errors without a field
    /// name. Never configured directly.
    BusinessLogic,
}

impl FieldKind {
    /// Whether hosts of this kind run validators.
    #[must_use]
    pub fn is_validatable(self) -> bool {
        matches!(
            self,
            FieldKind::Property | FieldKind::Input | FieldKind::BusinessLogic
        )
    }

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            FieldKind::Static => "static",
            FieldKind::Calculated => "calculated",
            FieldKind::Property => "property",
            FieldKind::Input => "input",
            FieldKind::BusinessLogic => "business_logic",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// What a computed configuration property can see.
pub struct DynamicContext<'a> {
    pub field: &'a str,
    pub value: Option<&'a Value>,
    pub resolver: &'a dyn ValueResolver,
}

type ComputeFn<T> = Arc<dyn Fn(&DynamicContext<'_>) -> T + Send + Sync>;

/// A configuration property that is either a literal or computed on demand.
pub enum Dynamic<T> {
    Literal(T),
    Computed(ComputeFn<T>),
}

impl<T: Clone> Dynamic<T> {
    pub fn computed(f: impl Fn(&DynamicContext<'_>) -> T + Send + Sync + 'static) -> Self {
        Dynamic::Computed(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &DynamicContext<'_>) -> T {
        match self {
            Dynamic::Literal(v) => v.clone(),
            Dynamic::Computed(f) => f(ctx),
        }
    }
}

impl<T: Clone> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        match self {
            Dynamic::Literal(v) => Dynamic::Literal(v.clone()),
            Dynamic::Computed(f) => Dynamic::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Dynamic::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(v: T) -> Self {
        Dynamic::Literal(v)
    }
}

impl From<&str> for Dynamic<String> {
    fn from(v: &str) -> Self {
        Dynamic::Literal(v.to_owned())
    }
}

/// Data-only description of a condition, turned into a live
/// [`Condition`] by a [`ConditionFactory`](crate::ConditionFactory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    pub condition_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionDescriptor>,
}

impl ConditionDescriptor {
    pub fn new(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            params: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: ConditionDescriptor) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn require() -> Self {
        Self::new("Require")
    }

    #[must_use]
    pub fn data_type_check() -> Self {
        Self::new("DataTypeCheck")
    }

    #[must_use]
    pub fn compare(op: CompareOp, value: impl Into<Value>) -> Self {
        Self::new("Compare")
            .param("op", op.to_string())
            .param("value", value)
    }

    #[must_use]
    pub fn compare_to_field(op: CompareOp, second_field: &str) -> Self {
        Self::new("CompareToField")
            .param("op", op.to_string())
            .param("second_field", second_field)
    }

    /// Shorthand for an equality comparison against another field.
    #[must_use]
    pub fn equal_to(second_field: &str) -> Self {
        Self::compare_to_field(CompareOp::Eq, second_field)
    }

    #[must_use]
    pub fn string_length(min: Option<i64>, max: Option<i64>) -> Self {
        let mut d = Self::new("StringLength");
        if let Some(min) = min {
            d = d.param("min", min);
        }
        if let Some(max) = max {
            d = d.param("max", max);
        }
        d
    }

    #[must_use]
    pub fn all(children: Vec<ConditionDescriptor>) -> Self {
        Self {
            children,
            ..Self::new("All")
        }
    }

    #[must_use]
    pub fn any(children: Vec<ConditionDescriptor>) -> Self {
        Self {
            children,
            ..Self::new("Any")
        }
    }

    #[must_use]
    pub fn not(child: ConditionDescriptor) -> Self {
        Self::new("Not").child(child)
    }
}

/// Produces a live condition for a rule without going through the factory.
#[derive(Clone)]
pub struct ConditionCreator(Arc<dyn Fn() -> Arc<dyn Condition> + Send + Sync>);

impl ConditionCreator {
    pub fn new(f: impl Fn() -> Arc<dyn Condition> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn create(&self) -> Arc<dyn Condition> {
        (self.0)()
    }
}

impl fmt::Debug for ConditionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConditionCreator(..)")
    }
}

/// One validation rule on a field.
///
/// Exactly one of `condition` and `condition_creator` must be set.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub condition: Option<ConditionDescriptor>,
    pub condition_creator: Option<ConditionCreator>,
    /// When set, the rule only runs while this condition matches.
    pub enabler: Option<ConditionDescriptor>,
    pub enabled: Dynamic<bool>,
    pub severity: Option<Dynamic<Severity>>,
    pub error_message: Option<Dynamic<String>>,
    pub error_message_key: Option<String>,
    pub summary_message: Option<Dynamic<String>>,
    pub summary_message_key: Option<String>,
    /// Stable key for merging and for issues. Defaults to the condition type.
    pub error_code: Option<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            condition: None,
            condition_creator: None,
            enabler: None,
            enabled: Dynamic::Literal(true),
            severity: None,
            error_message: None,
            error_message_key: None,
            summary_message: None,
            summary_message_key: None,
            error_code: None,
        }
    }
}

impl RuleConfig {
    #[must_use]
    pub fn new(condition: ConditionDescriptor) -> Self {
        Self {
            condition: Some(condition),
            ..Self::default()
        }
    }

    /// A rule whose condition is supplied directly rather than described.
    #[must_use]
    pub fn from_condition(condition: Arc<dyn Condition>) -> Self {
        Self {
            condition_creator: Some(ConditionCreator::new(move || Arc::clone(&condition))),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_owned());
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: impl Into<Dynamic<Severity>>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<Dynamic<String>>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn message_key(mut self, key: &str) -> Self {
        self.error_message_key = Some(key.to_owned());
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<Dynamic<String>>) -> Self {
        self.summary_message = Some(summary.into());
        self
    }

    #[must_use]
    pub fn summary_key(mut self, key: &str) -> Self {
        self.summary_message_key = Some(key.to_owned());
        self
    }

    #[must_use]
    pub fn enabler(mut self, enabler: ConditionDescriptor) -> Self {
        self.enabler = Some(enabler);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: impl Into<Dynamic<bool>>) -> Self {
        self.enabled = enabled.into();
        self
    }
}

/// Computes a calculated field's value from the fields it depends on.
#[derive(Clone)]
pub struct Calculation(Arc<dyn Fn(&dyn ValueResolver) -> Option<Value> + Send + Sync>);

impl Calculation {
    pub fn new(f: impl Fn(&dyn ValueResolver) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn compute(&self, resolver: &dyn ValueResolver) -> Option<Value> {
        (self.0)(resolver)
    }
}

impl fmt::Debug for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Calculation(..)")
    }
}

/// Business-authored configuration of one field. Immutable for the lifetime
/// of the host built from it.
#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKind,
    /// Lookup key for the converter service (`"integer"`, `"string"`, ...).
    pub data_type: Option<String>,
    pub label: Option<String>,
    /// Validation group used for partial validation.
    pub group: Option<String>,
    pub initial_value: Option<Value>,
    pub initial_enabled: bool,
    pub rules: Vec<RuleConfig>,
    pub calculation: Option<Calculation>,
    /// Fields read by `calculation`.
    pub depends_on: Vec<String>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            data_type: None,
            label: None,
            group: None,
            initial_value: None,
            initial_enabled: true,
            rules: Vec::new(),
            calculation: None,
            depends_on: Vec::new(),
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Input)
    }

    pub fn property(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Property)
    }

    pub fn static_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            initial_value: Some(value.into()),
            ..Self::new(name, FieldKind::Static)
        }
    }

    pub fn calculated(
        name: impl Into<String>,
        depends_on: &[&str],
        f: impl Fn(&dyn ValueResolver) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calculation: Some(Calculation::new(f)),
            depends_on: depends_on.iter().map(|s| (*s).to_owned()).collect(),
            ..Self::new(name, FieldKind::Calculated)
        }
    }

    #[must_use]
    pub fn data_type(mut self, data_type: &str) -> Self {
        self.data_type = Some(data_type.to_owned());
        self
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }

    #[must_use]
    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_owned());
        self
    }

    #[must_use]
    pub fn initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.initial_enabled = false;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: RuleConfig) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add a rule built from a condition descriptor with default settings.
    #[must_use]
    pub fn validate_with(self, condition: ConditionDescriptor) -> Self {
        self.rule(RuleConfig::new(condition))
    }

    /// The label used in messages, falling back to the field name.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Parse field configurations from configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`](crate::parse::ParseError) if the text is malformed.
    pub fn from_dsl(input: &str) -> Result<Vec<FieldConfig>, crate::parse::ParseError> {
        crate::parse::parse(input).map(|parsed| parsed.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFields;

    impl ValueResolver for NoFields {
        fn value_of(&self, _field: &str) -> Option<Value> {
            None
        }

        fn label_of(&self, _field: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn dynamic_literal_and_computed() {
        let ctx = DynamicContext {
            field: "Age",
            value: Some(&Value::Int(3)),
            resolver: &NoFields,
        };
        let lit: Dynamic<bool> = true.into();
        assert!(lit.resolve(&ctx));

        let computed = Dynamic::computed(|c: &DynamicContext<'_>| {
            c.value.and_then(Value::as_i64).unwrap_or(0) > 2
        });
        assert!(computed.resolve(&ctx));
        assert_eq!(format!("{computed:?}"), "Computed(..)");
    }

    #[test]
    fn descriptor_builders() {
        let d = ConditionDescriptor::equal_to("Password");
        assert_eq!(d.condition_type, "CompareToField");
        assert_eq!(d.params["op"], Value::String("==".into()));
        assert_eq!(d.params["second_field"], Value::String("Password".into()));

        let all = ConditionDescriptor::all(vec![
            ConditionDescriptor::require(),
            ConditionDescriptor::string_length(Some(2), None),
        ]);
        assert_eq!(all.children.len(), 2);
        assert!(!all.children[1].params.contains_key("max"));
    }

    #[test]
    fn field_builders() {
        let cfg = FieldConfig::input("Age")
            .data_type("integer")
            .label("Your age")
            .group("profile")
            .validate_with(ConditionDescriptor::require())
            .rule(RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 18_i64)).code("ADULT"));
        assert_eq!(cfg.kind, FieldKind::Input);
        assert_eq!(cfg.rules.len(), 2);
        assert_eq!(cfg.display_label(), "Your age");
        assert_eq!(cfg.rules[1].error_code.as_deref(), Some("ADULT"));
        assert!(cfg.initial_enabled);
    }

    #[test]
    fn kinds() {
        assert!(FieldKind::Input.is_validatable());
        assert!(!FieldKind::Static.is_validatable());
        assert!(!FieldKind::Calculated.is_validatable());
        assert_eq!(FieldKind::Property.to_string(), "property");
    }
}
