use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::builtin::{
    All, Any, CompareToField, CompareToValue, DataTypeCheck, Not, Require, StringLength,
};
use super::Condition;
use crate::types::{CompareOp, ConditionDescriptor, ConfigError, Value};

/// Turns condition descriptors into live conditions.
pub trait ConditionFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConditionType`] for unregistered types
    /// and [`ConfigError::InvalidParameter`] for bad parameters.
    fn create(&self, descriptor: &ConditionDescriptor) -> Result<Arc<dyn Condition>, ConfigError>;
}

type Constructor = Arc<
    dyn Fn(&ConditionDescriptor, &BuiltinConditionFactory) -> Result<Arc<dyn Condition>, ConfigError>
        + Send
        + Sync,
>;

/// Registry keyed by condition type, pre-loaded with the built-in catalogue.
///
/// Composite descriptors (`All`, `Any`, `Not`) build their children through
/// the same registry, so custom types can be nested inside them.
#[derive(Clone)]
pub struct BuiltinConditionFactory {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for BuiltinConditionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("BuiltinConditionFactory")
            .field("types", &types)
            .finish()
    }
}

impl Default for BuiltinConditionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinConditionFactory {
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("Require", |_, _| Ok(Arc::new(Require)));
        factory.register("DataTypeCheck", |_, _| Ok(Arc::new(DataTypeCheck)));
        factory.register("Compare", |d, _| {
            Ok(Arc::new(CompareToValue {
                op: op_param(d)?,
                value: required_param(d, "value")?.clone(),
            }))
        });
        factory.register("CompareToField", |d, _| {
            let second_field = string_param(d, "second_field")?;
            let op = if d.params.contains_key("op") {
                op_param(d)?
            } else {
                CompareOp::Eq
            };
            Ok(Arc::new(CompareToField { op, second_field }))
        });
        factory.register("StringLength", |d, _| {
            let min = length_param(d, "min")?;
            let max = length_param(d, "max")?;
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(invalid(d, "max", "must not be less than min"));
                }
            }
            Ok(Arc::new(StringLength { min, max }))
        });
        factory.register("All", |d, f| {
            Ok(Arc::new(All {
                children: f.children(d)?,
            }))
        });
        factory.register("Any", |d, f| {
            Ok(Arc::new(Any {
                children: f.children(d)?,
            }))
        });
        factory.register("Not", |d, f| {
            let mut children = f.children(d)?;
            if children.len() != 1 {
                return Err(invalid(d, "children", "expects exactly one child condition"));
            }
            Ok(Arc::new(Not {
                child: children.remove(0),
            }))
        });
        factory
    }

    /// Register (or replace) the constructor for a condition type.
    pub fn register(
        &mut self,
        condition_type: &str,
        constructor: impl Fn(&ConditionDescriptor, &BuiltinConditionFactory) -> Result<Arc<dyn Condition>, ConfigError>
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.constructors
            .insert(condition_type.to_owned(), Arc::new(constructor));
        self
    }

    #[must_use]
    pub fn supports(&self, condition_type: &str) -> bool {
        self.constructors.contains_key(condition_type)
    }

    fn children(&self, d: &ConditionDescriptor) -> Result<Vec<Arc<dyn Condition>>, ConfigError> {
        d.children.iter().map(|c| self.create(c)).collect()
    }
}

impl ConditionFactory for BuiltinConditionFactory {
    fn create(&self, descriptor: &ConditionDescriptor) -> Result<Arc<dyn Condition>, ConfigError> {
        let constructor = self
            .constructors
            .get(&descriptor.condition_type)
            .ok_or_else(|| ConfigError::UnknownConditionType {
                condition_type: descriptor.condition_type.clone(),
            })?;
        constructor(descriptor, self)
    }
}

fn invalid(d: &ConditionDescriptor, param: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        condition_type: d.condition_type.clone(),
        param: param.to_owned(),
        reason: reason.to_owned(),
    }
}

fn required_param<'a>(d: &'a ConditionDescriptor, name: &str) -> Result<&'a Value, ConfigError> {
    d.params.get(name).ok_or_else(|| invalid(d, name, "missing"))
}

fn string_param(d: &ConditionDescriptor, name: &str) -> Result<String, ConfigError> {
    required_param(d, name)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(d, name, "expected a string"))
}

fn op_param(d: &ConditionDescriptor) -> Result<CompareOp, ConfigError> {
    let symbol = string_param(d, "op")?;
    CompareOp::from_symbol(&symbol)
        .ok_or_else(|| invalid(d, "op", &format!("unknown operator '{symbol}'")))
}

fn length_param(d: &ConditionDescriptor, name: &str) -> Result<Option<usize>, ConfigError> {
    let Some(value) = d.params.get(name) else {
        return Ok(None);
    };
    let n = value
        .as_i64()
        .ok_or_else(|| invalid(d, name, "expected an integer"))?;
    usize::try_from(n)
        .map(Some)
        .map_err(|_| invalid(d, name, "must not be negative"))
}
