use fieldcheck::parse::load_fields;
use fieldcheck::{Services, ValidateOptions, ValidationManager};

fn main() {
    let fields = load_fields("demos/signup.fields").expect("failed to load fields");
    for field in &fields {
        println!("{} ({}), {} rule(s)", field.name, field.kind, field.rules.len());
    }

    let manager = ValidationManager::builder(Services::default())
        .fields(fields)
        .build()
        .expect("failed to build manager");

    let _ = manager.set_input_value("Age", "21").expect("no field named Age");
    let _ = manager.set_value("Password", "correct horse").expect("no field named Password");
    let _ = manager.set_value("ConfirmPassword", "correct hose").expect("no field named ConfirmPassword");

    let verdict = manager.validate(&ValidateOptions::default()).verdict().clone();
    println!("Verdict: {verdict}");
    for issue in verdict.issues_found() {
        println!("  {issue}");
    }
}
