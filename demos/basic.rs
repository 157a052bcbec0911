use fieldcheck::{
    BusinessLogicError, CompareOp, ConditionDescriptor, FieldConfig, RuleConfig, Services,
    ValidateOptions, ValidationManager,
};

fn main() {
    // Describe the form
    let manager = ValidationManager::builder(Services::default())
        .field(
            FieldConfig::property("Name")
                .label("Full name")
                .validate_with(ConditionDescriptor::require()),
        )
        .field(
            FieldConfig::input("Age").data_type("integer").rule(
                RuleConfig::new(ConditionDescriptor::compare(CompareOp::Gte, 18_i64))
                    .code("ADULT")
                    .message("{Label} must be at least {CompareTo}."),
            ),
        )
        .build()
        .expect("failed to build manager");

    // Simulate user input
    let _ = manager.set_input_value("Age", "16").expect("no field named Age");

    let pending = manager.validate(&ValidateOptions::default());
    println!("Verdict: {}", pending.verdict());
    for issue in pending.verdict().issues_found() {
        println!("  {issue}");
    }

    // A server-side check rejects the submission
    manager.set_business_logic_error(BusinessLogicError::new("Registration is closed"));
    println!("After server response: {}", manager.verdict());
}
