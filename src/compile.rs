//! Turns field configurations into validators and checks them for coding
//! faults before any host is built.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::condition::{Condition, DataTypeCheck};
use crate::services::Services;
use crate::types::{ConfigError, FieldConfig, FieldKind, RuleConfig};
use crate::validator::Validator;

/// Name of the pseudo-field that holds business-logic errors without a
/// field name.
pub const BUSINESS_LOGIC_FIELD: &str = "*";

/// A field configuration with its live validators.
#[derive(Debug, Clone)]
pub(crate) struct CompiledField {
    pub config: Arc<FieldConfig>,
    pub validators: Vec<Validator>,
    /// Other fields read by this field's conditions or calculation.
    pub dependencies: BTreeSet<String>,
}

impl CompiledField {
    /// The business-logic pseudo-field. It has no validators of its own.
    pub fn business_logic() -> Self {
        Self {
            config: Arc::new(FieldConfig::new(BUSINESS_LOGIC_FIELD, FieldKind::BusinessLogic)),
            validators: Vec::new(),
            dependencies: BTreeSet::new(),
        }
    }
}

/// Compile `configs` against the fields already running.
///
/// `existing` are the configurations that stay in place; entries with the
/// same name as one in `configs` are treated as replaced.
pub(crate) fn compile(
    configs: &[FieldConfig],
    existing: &[Arc<FieldConfig>],
    services: &Services,
) -> Result<Vec<CompiledField>, ConfigError> {
    check_duplicates(configs)?;
    check_reserved(configs)?;

    let new_names: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
    let mut all: Vec<&FieldConfig> = existing
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| !new_names.contains(c.name.as_str()))
        .collect();
    all.extend(configs);
    let known: HashSet<&str> = all.iter().map(|c| c.name.as_str()).collect();

    let compiled = configs
        .iter()
        .map(|config| compile_field(config, &known, services))
        .collect::<Result<Vec<_>, _>>()?;

    check_calculations(&all)?;
    Ok(compiled)
}

fn check_duplicates(configs: &[FieldConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for config in configs {
        if !seen.insert(&config.name) {
            return Err(ConfigError::DuplicateField {
                name: config.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_reserved(configs: &[FieldConfig]) -> Result<(), ConfigError> {
    match configs
        .iter()
        .find(|c| c.name == BUSINESS_LOGIC_FIELD || c.kind == FieldKind::BusinessLogic)
    {
        Some(c) => Err(ConfigError::ReservedName {
            name: c.name.clone(),
        }),
        None => Ok(()),
    }
}

fn compile_field(
    config: &FieldConfig,
    known: &HashSet<&str>,
    services: &Services,
) -> Result<CompiledField, ConfigError> {
    if !config.kind.is_validatable() && !config.rules.is_empty() {
        return Err(ConfigError::NotValidatable {
            name: config.name.clone(),
        });
    }

    let mut validators = Vec::with_capacity(config.rules.len() + 1);
    let mut codes = HashSet::new();

    let has_type_check = config
        .rules
        .iter()
        .any(|r| r.error_code.as_deref() == Some("DataTypeCheck"));
    if config.kind == FieldKind::Input && !has_type_check {
        let condition: Arc<dyn Condition> = Arc::new(DataTypeCheck);
        codes.insert("DataTypeCheck".to_owned());
        validators.push(Validator::new(
            "DataTypeCheck".to_owned(),
            condition,
            None,
            RuleConfig::default(),
        ));
    }

    for (rule_index, rule) in config.rules.iter().enumerate() {
        let validator = compile_rule(config, rule_index, rule, services)?;
        if !codes.insert(validator.error_code().to_owned()) {
            return Err(ConfigError::DuplicateErrorCode {
                field: config.name.clone(),
                code: validator.error_code().to_owned(),
            });
        }
        validators.push(validator);
    }

    let mut dependencies = BTreeSet::new();
    for validator in &validators {
        validator.gather_field_names(&mut dependencies);
    }
    if config.kind == FieldKind::Calculated {
        if config.calculation.is_none() {
            return Err(ConfigError::MissingCalculation {
                field: config.name.clone(),
            });
        }
        dependencies.extend(config.depends_on.iter().cloned());
    }
    dependencies.remove(&config.name);

    if let Some(reference) = dependencies.iter().find(|d| !known.contains(d.as_str())) {
        return Err(ConfigError::UnknownField {
            field: config.name.clone(),
            reference: reference.clone(),
        });
    }

    Ok(CompiledField {
        config: Arc::new(config.clone()),
        validators,
        dependencies,
    })
}

fn compile_rule(
    config: &FieldConfig,
    rule_index: usize,
    rule: &RuleConfig,
    services: &Services,
) -> Result<Validator, ConfigError> {
    let condition = match (&rule.condition, &rule.condition_creator) {
        (Some(descriptor), None) => services.condition_factory.create(descriptor)?,
        (None, Some(creator)) => creator.create(),
        (Some(_), Some(_)) => {
            return Err(ConfigError::ConflictingCondition {
                field: config.name.clone(),
                rule_index,
            })
        }
        (None, None) => {
            return Err(ConfigError::MissingCondition {
                field: config.name.clone(),
                rule_index,
            })
        }
    };
    let enabler = rule
        .enabler
        .as_ref()
        .map(|d| services.condition_factory.create(d))
        .transpose()?;

    let error_code = rule
        .error_code
        .clone()
        .or_else(|| rule.condition.as_ref().map(|d| d.condition_type.clone()))
        .unwrap_or_else(|| condition.condition_type().to_owned());

    Ok(Validator::new(error_code, condition, enabler, rule.clone()))
}

/// Reject cycles between calculated fields using Kahn's algorithm.
fn check_calculations(all: &[&FieldConfig]) -> Result<(), ConfigError> {
    let calculated: HashMap<&str, &FieldConfig> = all
        .iter()
        .filter(|c| c.kind == FieldKind::Calculated)
        .map(|c| (c.name.as_str(), *c))
        .collect();

    // dependents[X] = calculated fields whose calculation reads X
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = calculated.keys().map(|&n| (n, 0)).collect();

    for (&name, config) in &calculated {
        for dep in &config.depends_on {
            if let Some((&dep_name, _)) = calculated.get_key_value(dep.as_str()) {
                dependents.entry(dep_name).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0;

    while let Some(name) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if visited != calculated.len() {
        return Err(ConfigError::CyclicDependency {
            path: find_cycle(all, &calculated),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// DFS-based cycle finder for error reporting.
fn find_cycle(all: &[&FieldConfig], calculated: &HashMap<&str, &FieldConfig>) -> Vec<String> {
    let adj: HashMap<&str, Vec<&str>> = calculated
        .iter()
        .map(|(&name, config)| {
            let deps = config
                .depends_on
                .iter()
                .filter_map(|d| calculated.get_key_value(d.as_str()).map(|(&k, _)| k))
                .collect();
            (name, deps)
        })
        .collect();

    let mut state: HashMap<&str, DfsState> =
        adj.keys().map(|&n| (n, DfsState::Unvisited)).collect();
    let mut stack: Vec<&str> = Vec::new();

    // Start from fields in declaration order so the reported path is stable.
    for config in all.iter().filter(|c| c.kind == FieldKind::Calculated) {
        let name = config.name.as_str();
        if state.get(name) == Some(&DfsState::Unvisited) {
            if let Some(cycle) = dfs(name, &adj, &mut state, &mut stack) {
                return cycle;
            }
        }
    }

    vec![]
}

fn dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    state: &mut HashMap<&'a str, DfsState>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(node, DfsState::InStack);
    stack.push(node);

    for &neighbor in adj.get(node).into_iter().flatten() {
        match state.get(neighbor) {
            Some(DfsState::InStack) => {
                let pos = stack.iter().position(|&n| n == neighbor)?;
                let mut cycle: Vec<String> = stack[pos..].iter().map(|&s| s.to_owned()).collect();
                cycle.push(neighbor.to_owned());
                return Some(cycle);
            }
            Some(DfsState::Unvisited) | None => {
                if let Some(cycle) = dfs(neighbor, adj, state, stack) {
                    return Some(cycle);
                }
            }
            Some(DfsState::Done) => {}
        }
    }

    stack.pop();
    state.insert(node, DfsState::Done);
    None
}
