//! Reconciles a new list of field configurations against the running set.
//!
//! For every incoming configuration the engine decides which configuration
//! the rebuilt host gets and which state it starts from:
//!
//! * no host with that name: the new configuration, with a caller-supplied
//!   state, else a state saved from a snapshot, else defaults;
//! * a host of a different kind: the new configuration and a fresh state;
//! * same kind, [`MergeMode::Replace`]: the new configuration, keeping the
//!   running state unless the caller supplies one;
//! * same kind, [`MergeMode::Merge`]: non-rule properties from the new
//!   configuration, rules merged by error code (see [`merge_rules`]).

use std::collections::{HashMap, HashSet};

use crate::types::{FieldConfig, FieldState, RuleConfig};
use crate::value_host::ValueHost;

/// Error codes to drop per field during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveSet {
    by_field: HashMap<String, HashSet<String>>,
}

impl RemoveSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn remove(mut self, field: &str, error_code: &str) -> Self {
        self.by_field
            .entry(field.to_owned())
            .or_default()
            .insert(error_code.to_owned());
        self
    }

    #[must_use]
    pub fn contains(&self, field: &str, error_code: &str) -> bool {
        self.by_field
            .get(field)
            .is_some_and(|codes| codes.contains(error_code))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// The new configuration wholly supersedes the old one.
    #[default]
    Replace,
    /// Rules are merged into the existing list by error code.
    Merge(RemoveSet),
}

/// A host to build: its final configuration and starting state.
#[derive(Debug)]
pub(crate) struct PlannedField {
    pub config: FieldConfig,
    pub state: FieldState,
}

/// The key a rule is merged under. Mirrors the code the compiled validator
/// gets.
pub(crate) fn rule_code(rule: &RuleConfig) -> Option<String> {
    rule.error_code
        .clone()
        .or_else(|| rule.condition.as_ref().map(|d| d.condition_type.clone()))
        .or_else(|| {
            rule.condition_creator
                .as_ref()
                .map(|c| c.create().condition_type().to_owned())
        })
}

/// Merge `incoming` rules into `existing` positionally by error code.
///
/// A rule whose code matches an existing one overwrites it in place, an
/// unmatched rule is appended, and existing rules absent from `incoming`
/// stay unless `remove` lists them for `field`.
pub(crate) fn merge_rules(
    field: &str,
    existing: &[RuleConfig],
    incoming: &[RuleConfig],
    remove: &RemoveSet,
) -> Vec<RuleConfig> {
    let incoming_codes: HashSet<String> = incoming.iter().filter_map(rule_code).collect();
    let mut merged: Vec<(Option<String>, RuleConfig)> = existing
        .iter()
        .map(|r| (rule_code(r), r.clone()))
        .filter(|(code, _)| match code {
            Some(code) => incoming_codes.contains(code) || !remove.contains(field, code),
            None => true,
        })
        .collect();

    for rule in incoming {
        let code = rule_code(rule);
        let slot = code
            .as_ref()
            .and_then(|c| merged.iter().position(|(existing, _)| existing.as_ref() == Some(c)));
        match slot {
            Some(i) => merged[i].1 = rule.clone(),
            None => merged.push((code, rule.clone())),
        }
    }
    merged.into_iter().map(|(_, rule)| rule).collect()
}

/// Merge a whole field configuration: everything but the rules comes from
/// `incoming`.
pub(crate) fn merge_config(existing: &FieldConfig, incoming: &FieldConfig, remove: &RemoveSet) -> FieldConfig {
    FieldConfig {
        rules: merge_rules(&incoming.name, &existing.rules, &incoming.rules, remove),
        ..incoming.clone()
    }
}

/// Decide configuration and starting state for each incoming field.
pub(crate) fn plan<'a>(
    configs: Vec<FieldConfig>,
    mode: &MergeMode,
    current: impl Fn(&str) -> Option<&'a ValueHost>,
    initial_states: &mut HashMap<String, FieldState>,
    saved_states: &HashMap<String, FieldState>,
) -> Vec<PlannedField> {
    configs
        .into_iter()
        .map(|config| {
            let supplied = initial_states.remove(&config.name);
            match current(&config.name) {
                None => {
                    let state = supplied
                        .or_else(|| saved_states.get(&config.name).cloned())
                        .unwrap_or_else(|| ValueHost::initial_state(&config));
                    PlannedField { config, state }
                }
                Some(host) if host.kind() != config.kind => {
                    let state = supplied.unwrap_or_else(|| ValueHost::initial_state(&config));
                    PlannedField { config, state }
                }
                Some(host) => {
                    let state = supplied.unwrap_or_else(|| host.state().clone());
                    let config = match mode {
                        MergeMode::Replace => config,
                        MergeMode::Merge(remove) => merge_config(host.config(), &config, remove),
                    };
                    PlannedField { config, state }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompareOp, ConditionDescriptor, Severity};

    fn codes(rules: &[RuleConfig]) -> Vec<String> {
        rules.iter().filter_map(rule_code).collect()
    }

    fn rules() -> Vec<RuleConfig> {
        vec![
            RuleConfig::new(ConditionDescriptor::require()),
            RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 18_i64)).code("ADULT"),
            RuleConfig::new(ConditionDescriptor::string_length(None, Some(3))),
        ]
    }

    #[test]
    fn matching_code_replaces_in_place() {
        let incoming =
            vec![RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 21_i64))
                .code("ADULT")
                .severity(Severity::Warning)];
        let merged = merge_rules("Age", &rules(), &incoming, &RemoveSet::new());
        assert_eq!(merged.len(), 3);
        assert_eq!(codes(&merged), ["Require", "ADULT", "StringLength"]);
        assert_eq!(
            merged[1].condition.as_ref().unwrap().params["value"],
            crate::Value::Int(21)
        );
    }

    #[test]
    fn new_codes_append_and_omitted_codes_stay() {
        let incoming = vec![RuleConfig::new(ConditionDescriptor::equal_to("Other"))];
        let merged = merge_rules("Age", &rules(), &incoming, &RemoveSet::new());
        assert_eq!(
            codes(&merged),
            ["Require", "ADULT", "StringLength", "CompareToField"]
        );
    }

    #[test]
    fn remove_set_drops_omitted_codes_for_that_field_only() {
        let remove = RemoveSet::new().remove("Age", "ADULT").remove("Other", "Require");
        let merged = merge_rules("Age", &rules(), &[], &remove);
        assert_eq!(codes(&merged), ["Require", "StringLength"]);
        assert!(remove.contains("Other", "Require"));
        assert!(!remove.contains("Age", "Require"));
    }

    #[test]
    fn merge_config_takes_non_rule_properties_from_incoming() {
        let existing = FieldConfig::property("Age").label("Age").group("a");
        let existing = FieldConfig {
            rules: rules(),
            ..existing
        };
        let incoming = FieldConfig::property("Age").label("Your age");
        let merged = merge_config(&existing, &incoming, &RemoveSet::new());
        assert_eq!(merged.label.as_deref(), Some("Your age"));
        assert_eq!(merged.group, None);
        assert_eq!(merged.rules.len(), 3);
    }
}
