//! A small built-in condition catalogue.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use super::{Condition, ConditionCategory, EvaluationTarget, Evaluation, ValueResolver};
use crate::types::{CompareOp, ConditionError, ConditionResult, Value};

/// Matches when the field has a non-empty value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Require;

impl Condition for Require {
    fn condition_type(&self) -> &str {
        "Require"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Required
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        // Text that failed conversion was still entered.
        if target.input_value.is_some_and(|t| !t.trim().is_empty()) {
            return Ok(ConditionResult::Match.into());
        }
        let present = target.value.is_some_and(|v| !v.is_empty());
        Ok(ConditionResult::from_bool(present).into())
    }

    fn supports_during_edit(&self) -> bool {
        true
    }

    fn evaluate_during_edit(
        &self,
        text: &str,
        _target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        Ok(ConditionResult::from_bool(!text.trim().is_empty()).into())
    }
}

/// Matches unless the input text could not be converted to the field's
/// data type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataTypeCheck;

impl Condition for DataTypeCheck {
    fn condition_type(&self) -> &str {
        "DataTypeCheck"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::DataTypeCheck
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        Ok(ConditionResult::from_bool(target.conversion_error.is_none()).into())
    }
}

/// Compares the field's value against a literal.
#[derive(Debug, Clone)]
pub struct CompareToValue {
    pub op: CompareOp,
    pub value: Value,
}

impl Condition for CompareToValue {
    fn condition_type(&self) -> &str {
        "Compare"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Comparison
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        let Some(value) = target.value else {
            return Ok(ConditionResult::Undetermined.into());
        };
        let Some(ord) = resolver.compare(value, &self.value) else {
            debug!(field = target.field, compare_to = %self.value, "values are not comparable");
            return Ok(ConditionResult::Undetermined.into());
        };
        Ok(ConditionResult::from_bool(self.op.holds(ord)).into())
    }

    fn message_tokens(&self, _resolver: &dyn ValueResolver) -> Vec<(String, String)> {
        vec![
            ("CompareTo".to_owned(), self.value.to_string()),
            ("Operator".to_owned(), self.op.to_string()),
        ]
    }
}

/// Compares the field's value against another field's value.
#[derive(Debug, Clone)]
pub struct CompareToField {
    pub op: CompareOp,
    pub second_field: String,
}

impl Condition for CompareToField {
    fn condition_type(&self) -> &str {
        "CompareToField"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Comparison
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        let Some(value) = target.value else {
            return Ok(ConditionResult::Undetermined.into());
        };
        let Some(second) = resolver.value_of(&self.second_field) else {
            debug!(
                field = target.field,
                second_field = %self.second_field,
                "second field has no value"
            );
            return Ok(ConditionResult::Undetermined.into());
        };
        let Some(ord) = resolver.compare(value, &second) else {
            debug!(
                field = target.field,
                second_field = %self.second_field,
                "values are not comparable"
            );
            return Ok(ConditionResult::Undetermined.into());
        };
        Ok(ConditionResult::from_bool(self.op.holds(ord)).into())
    }

    fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        out.insert(self.second_field.clone());
    }

    fn message_tokens(&self, resolver: &dyn ValueResolver) -> Vec<(String, String)> {
        let label = resolver
            .label_of(&self.second_field)
            .unwrap_or_else(|| self.second_field.clone());
        let value = resolver
            .value_of(&self.second_field)
            .map(|v| v.to_string())
            .unwrap_or_default();
        vec![
            ("SecondLabel".to_owned(), label),
            ("SecondValue".to_owned(), value),
            ("Operator".to_owned(), self.op.to_string()),
        ]
    }
}

/// Character-count bounds on a string value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringLength {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLength {
    fn check(&self, text: &str) -> ConditionResult {
        let len = text.chars().count();
        let ok = self.min.map_or(true, |min| len >= min) && self.max.map_or(true, |max| len <= max);
        ConditionResult::from_bool(ok)
    }
}

impl Condition for StringLength {
    fn condition_type(&self) -> &str {
        "StringLength"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Contents
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        match target.value {
            Some(Value::String(s)) => Ok(self.check(s).into()),
            _ => Ok(ConditionResult::Undetermined.into()),
        }
    }

    fn supports_during_edit(&self) -> bool {
        true
    }

    fn evaluate_during_edit(
        &self,
        text: &str,
        _target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        Ok(self.check(text).into())
    }

    fn message_tokens(&self, _resolver: &dyn ValueResolver) -> Vec<(String, String)> {
        let mut tokens = Vec::new();
        if let Some(min) = self.min {
            tokens.push(("Min".to_owned(), min.to_string()));
        }
        if let Some(max) = self.max {
            tokens.push(("Max".to_owned(), max.to_string()));
        }
        tokens
    }
}

fn combine_all(results: &[ConditionResult]) -> ConditionResult {
    if results.contains(&ConditionResult::NoMatch) {
        ConditionResult::NoMatch
    } else if results.iter().all(|r| *r == ConditionResult::Match) {
        ConditionResult::Match
    } else {
        ConditionResult::Undetermined
    }
}

fn combine_any(results: &[ConditionResult]) -> ConditionResult {
    if results.contains(&ConditionResult::Match) {
        ConditionResult::Match
    } else if !results.is_empty() && results.iter().all(|r| *r == ConditionResult::NoMatch) {
        ConditionResult::NoMatch
    } else {
        ConditionResult::Undetermined
    }
}

fn evaluate_children(
    children: &[Arc<dyn Condition>],
    target: &EvaluationTarget<'_>,
    resolver: &dyn ValueResolver,
    combine: fn(&[ConditionResult]) -> ConditionResult,
) -> Result<Evaluation, ConditionError> {
    let evaluations = children
        .iter()
        .map(|c| c.evaluate(target, resolver))
        .collect::<Result<Vec<_>, _>>()?;

    let ready: Option<Vec<ConditionResult>> =
        evaluations.iter().map(Evaluation::ready_result).collect();
    if let Some(results) = ready {
        return Ok(combine(&results).into());
    }

    Ok(Evaluation::deferred(async move {
        let results = join_all(evaluations)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(combine(&results))
    }))
}

/// Matches when every child matches; `NoMatch` as soon as one does not.
#[derive(Debug, Clone, Default)]
pub struct All {
    pub children: Vec<Arc<dyn Condition>>,
}

impl Condition for All {
    fn condition_type(&self) -> &str {
        "All"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Composite
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        evaluate_children(&self.children, target, resolver, combine_all)
    }

    fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        for child in &self.children {
            child.gather_field_names(out);
        }
    }
}

/// Matches when at least one child matches.
#[derive(Debug, Clone, Default)]
pub struct Any {
    pub children: Vec<Arc<dyn Condition>>,
}

impl Condition for Any {
    fn condition_type(&self) -> &str {
        "Any"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Composite
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        evaluate_children(&self.children, target, resolver, combine_any)
    }

    fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        for child in &self.children {
            child.gather_field_names(out);
        }
    }
}

/// Inverts `Match` and `NoMatch`; `Undetermined` stays undetermined.
#[derive(Debug, Clone)]
pub struct Not {
    pub child: Arc<dyn Condition>,
}

fn invert(result: ConditionResult) -> ConditionResult {
    match result {
        ConditionResult::Match => ConditionResult::NoMatch,
        ConditionResult::NoMatch => ConditionResult::Match,
        ConditionResult::Undetermined => ConditionResult::Undetermined,
    }
}

impl Condition for Not {
    fn condition_type(&self) -> &str {
        "Not"
    }

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Composite
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        match self.child.evaluate(target, resolver)? {
            Evaluation::Ready(r) => Ok(invert(r).into()),
            Evaluation::Deferred(fut) => Ok(Evaluation::deferred(async move {
                Ok(invert(fut.await?))
            })),
        }
    }

    fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        self.child.gather_field_names(out);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures::executor::block_on;

    use super::*;

    #[derive(Default)]
    struct Fields(HashMap<String, Value>);

    impl Fields {
        fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
            self.0.insert(name.to_owned(), value.into());
            self
        }
    }

    impl ValueResolver for Fields {
        fn value_of(&self, field: &str) -> Option<Value> {
            self.0.get(field).cloned()
        }

        fn label_of(&self, field: &str) -> Option<String> {
            self.0.contains_key(field).then(|| format!("{field} label"))
        }
    }

    fn eval(c: &dyn Condition, value: Option<&Value>, fields: &Fields) -> ConditionResult {
        let target = EvaluationTarget::new("f", value);
        block_on(c.evaluate(&target, fields).unwrap()).unwrap()
    }

    #[derive(Debug)]
    struct Slow(ConditionResult);

    impl Condition for Slow {
        fn condition_type(&self) -> &str {
            "Slow"
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

    #[test]
    fn require_on_values() {
        let fields = Fields::default();
        assert_eq!(eval(&Require, None, &fields), ConditionResult::NoMatch);
        assert_eq!(
            eval(&Require, Some(&Value::from("")), &fields),
            ConditionResult::NoMatch
        );
        assert_eq!(
            eval(&Require, Some(&Value::from("x")), &fields),
            ConditionResult::Match
        );
        assert_eq!(eval(&Require, Some(&Value::Int(0)), &fields), ConditionResult::Match);
    }

    #[test]
    fn require_counts_unconverted_input_as_present() {
        let target = EvaluationTarget {
            input_value: Some("abc"),
            conversion_error: Some("not a number"),
            ..EvaluationTarget::new("Age", None)
        };
        let r = block_on(Require.evaluate(&target, &Fields::default()).unwrap()).unwrap();
        assert_eq!(r, ConditionResult::Match);
    }

    #[test]
    fn require_during_edit_reads_text() {
        let target = EvaluationTarget::new("f", None);
        let fields = Fields::default();
        let r = Require.evaluate_during_edit("  ", &target, &fields).unwrap();
        assert_eq!(r.ready_result(), Some(ConditionResult::NoMatch));
        let r = Require.evaluate_during_edit("a", &target, &fields).unwrap();
        assert_eq!(r.ready_result(), Some(ConditionResult::Match));
    }

    #[test]
    fn data_type_check_follows_conversion_error() {
        let fields = Fields::default();
        let bad = EvaluationTarget {
            conversion_error: Some("bad"),
            ..EvaluationTarget::new("f", None)
        };
        let r = DataTypeCheck.evaluate(&bad, &fields).unwrap();
        assert_eq!(r.ready_result(), Some(ConditionResult::NoMatch));
        assert_eq!(eval(&DataTypeCheck, None, &fields), ConditionResult::Match);
    }

    #[test]
    fn compare_to_value() {
        let c = CompareToValue {
            op: CompareOp::Gte,
            value: Value::Int(18),
        };
        let fields = Fields::default();
        assert_eq!(eval(&c, Some(&Value::Int(20)), &fields), ConditionResult::Match);
        assert_eq!(eval(&c, Some(&Value::Int(2)), &fields), ConditionResult::NoMatch);
        assert_eq!(eval(&c, None, &fields), ConditionResult::Undetermined);
        assert_eq!(
            eval(&c, Some(&Value::from("x")), &fields),
            ConditionResult::Undetermined
        );
    }

    #[test]
    fn compare_to_field_reads_through_resolver() {
        let c = CompareToField {
            op: CompareOp::Eq,
            second_field: "Password".into(),
        };
        let fields = Fields::default().with("Password", "abc");
        assert_eq!(eval(&c, Some(&Value::from("abc")), &fields), ConditionResult::Match);
        assert_eq!(eval(&c, Some(&Value::from("xyz")), &fields), ConditionResult::NoMatch);
        assert_eq!(
            eval(&c, Some(&Value::from("abc")), &Fields::default()),
            ConditionResult::Undetermined
        );

        let mut names = BTreeSet::new();
        c.gather_field_names(&mut names);
        assert!(names.contains("Password"));

        let tokens = c.message_tokens(&fields);
        assert!(tokens.contains(&("SecondLabel".to_owned(), "Password label".to_owned())));
    }

    #[test]
    fn string_length_bounds() {
        let c = StringLength {
            min: Some(2),
            max: Some(4),
        };
        let fields = Fields::default();
        assert_eq!(eval(&c, Some(&Value::from("a")), &fields), ConditionResult::NoMatch);
        assert_eq!(eval(&c, Some(&Value::from("abc")), &fields), ConditionResult::Match);
        assert_eq!(eval(&c, Some(&Value::from("abcde")), &fields), ConditionResult::NoMatch);
        assert_eq!(eval(&c, Some(&Value::Int(3)), &fields), ConditionResult::Undetermined);
    }

    #[test]
    fn all_any_not_combine_tri_state() {
        let fields = Fields::default();
        let all = All {
            children: vec![Arc::new(Require), Arc::new(StringLength { min: Some(3), max: None })],
        };
        assert_eq!(eval(&all, Some(&Value::from("ab")), &fields), ConditionResult::NoMatch);
        assert_eq!(eval(&all, Some(&Value::from("abc")), &fields), ConditionResult::Match);
        assert_eq!(eval(&all, Some(&Value::Int(1)), &fields), ConditionResult::Undetermined);

        let any = Any {
            children: vec![Arc::new(Require), Arc::new(StringLength { min: Some(3), max: None })],
        };
        assert_eq!(eval(&any, Some(&Value::from("ab")), &fields), ConditionResult::Match);
        assert_eq!(eval(&any, None, &fields), ConditionResult::Undetermined);

        let not = Not {
            child: Arc::new(Require),
        };
        assert_eq!(eval(&not, None, &fields), ConditionResult::Match);
    }

    #[test]
    fn composite_with_deferred_child_is_deferred() {
        let all = All {
            children: vec![Arc::new(Require), Arc::new(Slow(ConditionResult::NoMatch))],
        };
        let target = EvaluationTarget::new("f", Some(&Value::Int(1)));
        let evaluation = all.evaluate(&target, &Fields::default()).unwrap();
        assert!(evaluation.ready_result().is_none());
        assert_eq!(block_on(evaluation), Ok(ConditionResult::NoMatch));

        let not = Not {
            child: Arc::new(Slow(ConditionResult::NoMatch)),
        };
        assert_eq!(eval(&not, None, &Fields::default()), ConditionResult::Match);
    }
}
