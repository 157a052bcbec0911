mod strategies;

use fieldcheck::{
    ManagerSnapshot, MergeMode, RemoveSet, Services, ValidateOptions, ValidationManager,
    ValidationStatus,
};
use proptest::prelude::*;
use strategies::{arb_business_logic_errors, arb_configs, arb_values, fill, manager, FIELDS};

fn codes(manager: &ValidationManager, field: &str) -> Vec<String> {
    manager
        .configs()
        .iter()
        .find(|c| c.name == field)
        .map(|c| {
            c.rules
                .iter()
                .filter_map(|r| r.error_code.clone().or_else(|| r.condition.as_ref().map(|d| d.condition_type.clone())))
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Invariant 1: Validity
//
// The verdict is valid exactly when no reported issue blocks saving, and a
// field is Invalid exactly when it holds a blocking issue.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn valid_iff_no_blocking_issue(configs in arb_configs(), values in arb_values()) {
        let manager = manager(configs);
        fill(&manager, &values);
        let verdict = manager.validate(&ValidateOptions::default()).verdict().clone();

        let blocking = verdict.issues_found().iter().any(|i| i.severity.blocks_save());
        prop_assert_eq!(verdict.is_valid(), !blocking);
        prop_assert_eq!(manager.is_valid(), verdict.is_valid());
        if !verdict.is_valid() {
            prop_assert!(verdict.do_not_save());
        }

        for name in FIELDS {
            let state = manager.field_state(name).unwrap();
            let field_blocking = state.has_blocking_issue();
            let status = manager.field_status(name).unwrap();
            prop_assert_eq!(status == ValidationStatus::Invalid, field_blocking, "field {}", name);
        }
    }

    #[test]
    fn business_logic_errors_count_toward_validity(
        configs in arb_configs(),
        values in arb_values(),
        errors in arb_business_logic_errors(),
    ) {
        let manager = manager(configs);
        fill(&manager, &values);
        let _ = manager.validate(&ValidateOptions::default());
        let any_blocking = manager.set_business_logic_errors(errors, false);

        let verdict = manager.verdict();
        let blocking = verdict.issues_found().iter().any(|i| i.severity.blocks_save());
        prop_assert_eq!(verdict.is_valid(), !blocking);
        if any_blocking {
            prop_assert!(!verdict.is_valid());
        }

        manager.clear_business_logic_errors(false);
        prop_assert!(manager.field_state(fieldcheck::BUSINESS_LOGIC_FIELD).is_none());
    }
}

// ---------------------------------------------------------------------------
// Invariant 2: Idempotence
//
// Validating twice with no change in between yields identical issues.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn validate_is_idempotent(configs in arb_configs(), values in arb_values()) {
        let manager = manager(configs);
        fill(&manager, &values);
        let first = manager.validate(&ValidateOptions::default()).verdict().clone();
        let second = manager.validate(&ValidateOptions::default()).verdict().clone();
        prop_assert_eq!(first.issues_found(), second.issues_found());
        prop_assert_eq!(first, second);
    }
}

// ---------------------------------------------------------------------------
// Invariant 3: Snapshot round-trip
//
// A snapshot survives JSON and restores into an identical manager.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn snapshot_round_trip(
        configs in arb_configs(),
        values in arb_values(),
        errors in arb_business_logic_errors(),
    ) {
        let original = manager(configs.clone());
        fill(&original, &values);
        let _ = original.validate(&ValidateOptions::default());
        original.set_business_logic_errors(errors, true);

        let snapshot = original.snapshot();
        let json = snapshot.to_json().unwrap();
        let parsed = ManagerSnapshot::from_json(&json).unwrap();
        prop_assert_eq!(&parsed, &snapshot);

        let restored = ValidationManager::builder(Services::default())
            .fields(configs)
            .snapshot(parsed)
            .build()
            .unwrap();
        prop_assert_eq!(restored.snapshot(), snapshot);
        prop_assert_eq!(restored.verdict(), original.verdict());
    }
}

// ---------------------------------------------------------------------------
// Invariant 4: Merge keeps what it is not told to remove
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn merge_never_drops_unlisted_codes(first in arb_configs(), second in arb_configs()) {
        let manager = manager(first);
        let before: Vec<Vec<String>> = FIELDS.iter().map(|f| codes(&manager, f)).collect();

        manager
            .apply_config(second, &MergeMode::Merge(RemoveSet::new()), Vec::new())
            .unwrap();

        for (field, old) in FIELDS.iter().zip(before) {
            let now = codes(&manager, field);
            for code in old {
                prop_assert!(now.contains(&code), "{} lost {}", field, code);
            }
        }
    }

    #[test]
    fn merge_drops_listed_codes(first in arb_configs()) {
        let manager = manager(first);
        let remove = FIELDS
            .iter()
            .fold(RemoveSet::new(), |set, f| set.remove(f, "CMP").remove(f, "CROSS"));
        let bare = FIELDS.iter().map(|f| fieldcheck::FieldConfig::property(*f)).collect();

        manager.apply_config(bare, &MergeMode::Merge(remove), Vec::new()).unwrap();

        for field in FIELDS {
            let now = codes(&manager, field);
            prop_assert!(!now.iter().any(|c| c == "CMP" || c == "CROSS"));
        }
    }
}
