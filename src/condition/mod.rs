//! The condition evaluation protocol.
//!
//! A [`Condition`] is a stateless tri-state predicate over a field's value.
//! It reads other fields only through a [`ValueResolver`], so one instance
//! can be built once and shared. Evaluation returns an [`Evaluation`], which
//! is itself a future: synchronous conditions hand back an already-completed
//! one, asynchronous conditions a boxed future.

mod builtin;
mod factory;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;

use crate::types::{ConditionError, ConditionResult, Value};

pub use builtin::{
    All, Any, CompareToField, CompareToValue, DataTypeCheck, Not, Require, StringLength,
};
pub use factory::{BuiltinConditionFactory, ConditionFactory};

/// Read access to the other fields of the running manager.
pub trait ValueResolver {
    /// Current value of a field; calculated fields are computed on demand.
    fn value_of(&self, field: &str) -> Option<Value>;

    /// Display label of a field.
    fn label_of(&self, field: &str) -> Option<String>;

    /// Ordering used by comparison conditions. `None` means the values
    /// cannot be compared.
    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        a.partial_cmp_value(b)
    }
}

/// The field a condition is evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationTarget<'a> {
    pub field: &'a str,
    pub value: Option<&'a Value>,
    /// Raw text of an input field.
    pub input_value: Option<&'a str>,
    /// Set when the input text could not be converted to a native value.
    pub conversion_error: Option<&'a str>,
}

impl<'a> EvaluationTarget<'a> {
    #[must_use]
    pub fn new(field: &'a str, value: Option<&'a Value>) -> Self {
        Self {
            field,
            value,
            input_value: None,
            conversion_error: None,
        }
    }
}

/// Broad classification used by the validator for skip rules and default
/// severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCategory {
    /// Skipped during preliminary passes; defaults to `Severe`.
    Required,
    /// Defaults to `Severe`.
    DataTypeCheck,
    Comparison,
    Contents,
    Composite,
    Other,
}

/// The result of [`Condition::evaluate`].
///
/// Implements `Future` so callers have one code path; `Ready` completes on
/// the first poll.
pub enum Evaluation {
    Ready(ConditionResult),
    Deferred(BoxFuture<'static, Result<ConditionResult, ConditionError>>),
}

impl Evaluation {
    pub fn deferred(
        fut: impl Future<Output = Result<ConditionResult, ConditionError>> + Send + 'static,
    ) -> Self {
        Evaluation::Deferred(Box::pin(fut))
    }

    /// The result if it is already known.
    #[must_use]
    pub fn ready_result(&self) -> Option<ConditionResult> {
        match self {
            Evaluation::Ready(r) => Some(*r),
            Evaluation::Deferred(_) => None,
        }
    }
}

impl From<ConditionResult> for Evaluation {
    fn from(result: ConditionResult) -> Self {
        Evaluation::Ready(result)
    }
}

impl Future for Evaluation {
    type Output = Result<ConditionResult, ConditionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            Evaluation::Ready(result) => Poll::Ready(Ok(*result)),
            Evaluation::Deferred(fut) => fut.as_mut().poll(cx),
        }
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Ready(r) => f.debug_tuple("Ready").field(r).finish(),
            Evaluation::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A stateless tri-state rule predicate.
pub trait Condition: Send + Sync + fmt::Debug {
    /// Type name; the default error code of rules using this condition.
    fn condition_type(&self) -> &str;

    fn category(&self) -> ConditionCategory {
        ConditionCategory::Other
    }

    /// Evaluate against the target's current value.
    ///
    /// # Errors
    ///
    /// An `Err` is caught by the validator, logged, and treated as
    /// `Undetermined`; it never aborts a validation pass.
    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError>;

    /// Whether [`evaluate_during_edit`](Self::evaluate_during_edit) is
    /// implemented. Conditions without it are skipped in edit-time passes.
    fn supports_during_edit(&self) -> bool {
        false
    }

    /// Evaluate the raw text the user is still typing.
    ///
    /// # Errors
    ///
    /// Same policy as [`evaluate`](Self::evaluate).
    fn evaluate_during_edit(
        &self,
        text: &str,
        target: &EvaluationTarget<'_>,
        resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        let _ = (text, target, resolver);
        Ok(Evaluation::Ready(ConditionResult::Undetermined))
    }

    /// Add the names of other fields this condition reads.
    fn gather_field_names(&self, out: &mut BTreeSet<String>) {
        let _ = out;
    }

    /// Extra `{Token}` values available to this condition's messages.
    fn message_tokens(&self, resolver: &dyn ValueResolver) -> Vec<(String, String)> {
        let _ = resolver;
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn ready_evaluation_completes_immediately() {
        let eval = Evaluation::from(ConditionResult::NoMatch);
        assert_eq!(eval.ready_result(), Some(ConditionResult::NoMatch));
        assert_eq!(block_on(eval), Ok(ConditionResult::NoMatch));
    }

    #[test]
    fn deferred_evaluation_resolves_through_future() {
        let eval = Evaluation::deferred(async { Ok(ConditionResult::Match) });
        assert_eq!(eval.ready_result(), None);
        assert_eq!(format!("{eval:?}"), "Deferred(..)");
        assert_eq!(block_on(eval), Ok(ConditionResult::Match));
    }

    #[test]
    fn deferred_rejection_surfaces_error() {
        let eval = Evaluation::deferred(async { Err(ConditionError::new("Remote", "down")) });
        assert_eq!(block_on(eval), Err(ConditionError::new("Remote", "down")));
    }
}
