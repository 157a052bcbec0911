use std::path::PathBuf;
use std::time::Duration;

use fieldcheck::parse::{load_fields, parse};
use fieldcheck::{
    FieldConfig, FieldKind, MergeMode, RemoveSet, Services, Severity, ValidateOptions,
    ValidationManager, ValidationStatus, Value,
};

const SIGNUP: &str = r#"
# sign-up form
static Country = "NZ"

input Age: integer {
    label "Your age"
    group "profile"
    rule Require
    rule Compare(op = >=, value = 18) {
        code "ADULT"
        severity warning
        message "{Label} must be at least {CompareTo}."
    }
}

property Password {
    rule StringLength(min = 8) {
        message "Use at least eight characters."
    }
}

property ConfirmPassword {
    label "Confirm password"
    rule CompareToField(op = ==, second_field = "Password") {
        code "MATCH"
        message "Passwords differ."
    }
}

property Nickname {
    disabled
    rule Require
}
"#;

fn manager_from(text: &str) -> ValidationManager {
    ValidationManager::builder(Services::default())
        .fields(parse(text).unwrap().fields)
        .notify_delay(Duration::ZERO)
        .build()
        .unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fieldcheck-{}-{name}", std::process::id()))
}

#[test]
fn parsed_form_keeps_declaration_order() {
    let parsed = parse(SIGNUP).unwrap();
    let names: Vec<_> = parsed.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        ["Country", "Age", "Password", "ConfirmPassword", "Nickname"]
    );
    assert_eq!(parsed.field("Country").unwrap().kind, FieldKind::Static);
    assert!(!parsed.field("Nickname").unwrap().initial_enabled);
    assert!(parsed.field("Ghost").is_none());
}

#[test]
fn parsed_form_validates() {
    let manager = manager_from(SIGNUP);
    let _ = manager.set_input_value("Age", "16").unwrap();
    let _ = manager.set_value("Password", "hunter2").unwrap();
    let _ = manager.set_value("ConfirmPassword", "hunter3").unwrap();

    let verdict = manager.validate(&ValidateOptions::default()).verdict().clone();
    let found: Vec<_> = verdict
        .issues_found()
        .iter()
        .map(|i| (i.field.as_str(), i.error_code.as_str(), i.severity))
        .collect();
    assert_eq!(
        found,
        [
            ("Age", "ADULT", Severity::Warning),
            ("Password", "StringLength", Severity::Error),
            ("ConfirmPassword", "MATCH", Severity::Error),
        ]
    );
    assert_eq!(verdict.issues_found()[0].error_message, "Your age must be at least 18.");
    assert_eq!(verdict.issues_found()[1].error_message, "Use at least eight characters.");
    assert_eq!(manager.field_status("Nickname"), Some(ValidationStatus::Disabled));
    assert_eq!(manager.value("Country"), Some(Value::from("NZ")));
}

#[test]
fn parsed_fix_merges_into_running_form() {
    let manager = manager_from(SIGNUP);
    let patch = FieldConfig::from_dsl(
        r#"property Password {
            rule Require
            rule StringLength(min = 4)
        }"#,
    )
    .unwrap();
    manager
        .apply_config(patch, &MergeMode::Merge(RemoveSet::new()), Vec::new())
        .unwrap();

    let password = manager
        .configs()
        .into_iter()
        .find(|c| c.name == "Password")
        .unwrap();
    assert_eq!(password.rules.len(), 2);

    let _ = manager.set_value("Password", "abcd").unwrap();
    let pending = manager
        .validate_field("Password", &ValidateOptions::default())
        .unwrap();
    assert!(pending.results()[0].issues_found().is_empty());
}

#[test]
fn load_fields_reads_a_file() {
    let path = temp_path("signup.fields");
    std::fs::write(&path, SIGNUP).unwrap();

    let fields = load_fields(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[1].data_type.as_deref(), Some("integer"));
}

#[test]
fn load_fields_reports_missing_file() {
    let err = load_fields(temp_path("does-not-exist.fields")).unwrap_err();
    assert!(matches!(err, fieldcheck::Error::Io(_)));
}

#[test]
fn load_fields_reports_malformed_text() {
    let path = temp_path("broken.fields");
    std::fs::write(&path, "property A { label }").unwrap();

    let err = load_fields(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, fieldcheck::Error::Parse(_)));
}

#[test]
fn error_offset_points_at_problem() {
    let text = "property A {\n    colour \"red\"\n}";
    let err = parse(text).unwrap_err();
    assert_eq!(err.offset(), text.find("colour").unwrap());
    assert!(err.message().contains("field setting"), "{err}");
}

#[test]
fn unknown_condition_surfaces_at_build() {
    let fields = parse("property A { rule Telepathy(range = 3) }").unwrap().fields;
    let err = ValidationManager::builder(Services::default())
        .fields(fields)
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown condition type 'Telepathy'");
}

#[test]
fn empty_text_is_empty_form() {
    assert!(parse("").unwrap().fields.is_empty());
    assert!(parse("  # nothing here\n").unwrap().fields.is_empty());
}
