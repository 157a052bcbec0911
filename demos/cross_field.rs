use std::rc::Rc;

use fieldcheck::{
    ConditionDescriptor, FieldConfig, ManualScheduler, Scheduler, Services, SetValueOptions,
    ValidateOptions, ValidationManager, Value, DEFAULT_NOTIFY_DELAY,
};

fn main() {
    let scheduler = Rc::new(ManualScheduler::new());
    let services = Services::default().with_scheduler(scheduler.clone() as Rc<dyn Scheduler>);

    let manager = ValidationManager::builder(services)
        .field(FieldConfig::property("Price").initial_value(12_i64))
        .field(FieldConfig::property("Quantity").initial_value(3_i64))
        .field(FieldConfig::calculated("Total", &["Price", "Quantity"], |r| {
            let price = r.value_of("Price")?.as_i64()?;
            let quantity = r.value_of("Quantity")?.as_i64()?;
            Some(Value::Int(price * quantity))
        }))
        .field(
            FieldConfig::property("Budget")
                .initial_value(40_i64)
                .validate_with(ConditionDescriptor::compare_to_field(
                    fieldcheck::CompareOp::Gte,
                    "Total",
                )),
        )
        .on_field_state_changed(|state| println!("  [state] {} -> {}", state.name, state.status))
        .on_verdict_changed(|verdict| println!("  [verdict] {verdict}"))
        .build()
        .expect("failed to build manager");

    println!("Initial validation:");
    let _ = manager.validate(&ValidateOptions::default());

    println!("Quantity changes to 4 (Budget is re-validated):");
    let _ = manager
        .set_value_with("Quantity", Some(Value::Int(4)), SetValueOptions::validate())
        .expect("no field named Quantity");
    println!("  Total is now {:?}", manager.value("Total"));

    println!("Debounce window elapses:");
    scheduler.advance(DEFAULT_NOTIFY_DELAY);

    for issue in manager.issues_found(None) {
        println!("Issue: {issue}");
    }
}
