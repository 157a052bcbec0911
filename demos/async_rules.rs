use std::time::Duration;

use fieldcheck::{
    Condition, ConditionDescriptor, ConditionError, ConditionResult, Evaluation, EvaluationTarget,
    FieldConfig, RuleConfig, Services, ValidateOptions, ValidationManager, ValueResolver,
};

/// Pretends to ask a server whether a user name is free.
#[derive(Debug)]
struct UserNameAvailable {
    taken: Vec<&'static str>,
}

impl Condition for UserNameAvailable {
    fn condition_type(&self) -> &str {
        "UserNameAvailable"
    }

    fn evaluate(
        &self,
        target: &EvaluationTarget<'_>,
        _resolver: &dyn ValueResolver,
    ) -> Result<Evaluation, ConditionError> {
        let Some(name) = target.value.and_then(|v| v.as_str()).map(str::to_owned) else {
            return Ok(ConditionResult::Undetermined.into());
        };
        let free = !self.taken.contains(&name.as_str());
        Ok(Evaluation::deferred(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ConditionResult::from_bool(free))
        }))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let manager = ValidationManager::builder(Services::default())
        .field(
            FieldConfig::property("UserName")
                .label("User name")
                .validate_with(ConditionDescriptor::require())
                .rule(
                    RuleConfig::from_condition(std::sync::Arc::new(UserNameAvailable {
                        taken: vec!["admin", "root"],
                    }))
                    .code("AVAILABLE")
                    .message("{Label} '{Value}' is already taken."),
                ),
        )
        .on_verdict_changed(|verdict| println!("  [verdict] {verdict}"))
        .notify_delay(Duration::ZERO)
        .build()
        .expect("failed to build manager");

    for candidate in ["admin", "devin"] {
        println!("Checking {candidate}:");
        let _ = manager.set_value("UserName", candidate).expect("no field named UserName");

        let pending = manager.validate(&ValidateOptions::default());
        println!("  before lookup: {:?}", manager.field_status("UserName"));

        match pending.await {
            Ok(verdict) => {
                for issue in verdict.issues_found() {
                    println!("  {issue}");
                }
            }
            Err(err) => println!("  lookup failed: {err}"),
        }
        println!("  after lookup: {:?}", manager.field_status("UserName"));
    }
}
