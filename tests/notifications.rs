use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fieldcheck::{
    ConditionDescriptor, FieldConfig, ManualScheduler, MergeMode, Scheduler, Services,
    SetValueOptions, ValidateOptions, ValidationManager, ValidationManagerBuilder,
    ValidationStatus, Value, DEFAULT_NOTIFY_DELAY,
};

#[derive(Default)]
struct Log {
    verdicts: Vec<bool>,
    states: Vec<(String, ValidationStatus)>,
    values: Vec<(String, Option<Value>)>,
    configs: Vec<usize>,
}

struct Harness {
    manager: ValidationManager,
    scheduler: Rc<ManualScheduler>,
    log: Rc<RefCell<Log>>,
}

fn fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::property("First").validate_with(ConditionDescriptor::require()),
        FieldConfig::property("Last").validate_with(ConditionDescriptor::require()),
    ]
}

fn wired(builder: ValidationManagerBuilder, log: &Rc<RefCell<Log>>) -> ValidationManagerBuilder {
    let (l1, l2, l3, l4) = (log.clone(), log.clone(), log.clone(), log.clone());
    builder
        .on_verdict_changed(move |v| l1.borrow_mut().verdicts.push(v.is_valid()))
        .on_field_state_changed(move |s| l2.borrow_mut().states.push((s.name.clone(), s.status)))
        .on_value_changed(move |f, v| l3.borrow_mut().values.push((f.to_owned(), v.cloned())))
        .on_config_changed(move |c| l4.borrow_mut().configs.push(c.len()))
}

fn harness() -> Harness {
    let scheduler = Rc::new(ManualScheduler::new());
    let services = Services::default().with_scheduler(scheduler.clone() as Rc<dyn Scheduler>);
    let log = Rc::new(RefCell::new(Log::default()));
    let manager = wired(ValidationManager::builder(services).fields(fields()), &log)
        .build()
        .unwrap();
    Harness {
        manager,
        scheduler,
        log,
    }
}

#[test]
fn build_is_silent() {
    let h = harness();
    let log = h.log.borrow();
    assert!(log.verdicts.is_empty());
    assert!(log.states.is_empty());
    assert!(log.configs.is_empty());
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn rapid_changes_coalesce_into_one_verdict() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    let _ = h.manager.set_value("Last", "Lovelace").unwrap();
    let _ = h.manager.set_value("First", "Grace").unwrap();
    assert!(h.log.borrow().verdicts.is_empty());
    assert_eq!(h.scheduler.pending(), 1);

    h.scheduler.advance(DEFAULT_NOTIFY_DELAY / 2);
    assert!(h.log.borrow().verdicts.is_empty());

    h.scheduler.advance(DEFAULT_NOTIFY_DELAY);
    assert_eq!(h.log.borrow().verdicts, [true]);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn each_change_restarts_the_window() {
    let h = harness();
    let step = DEFAULT_NOTIFY_DELAY * 3 / 4;
    let _ = h.manager.set_value("First", "Ada").unwrap();
    h.scheduler.advance(step);
    let _ = h.manager.set_value("Last", "Byron").unwrap();
    h.scheduler.advance(step);
    assert!(h.log.borrow().verdicts.is_empty());

    h.scheduler.advance(step);
    assert_eq!(h.log.borrow().verdicts.len(), 1);
}

#[test]
fn full_validation_notifies_immediately_and_keeps_debounce() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    assert_eq!(h.scheduler.pending(), 1);

    let _ = h.manager.validate(&ValidateOptions::default());
    assert_eq!(h.log.borrow().verdicts, [false]);
    assert_eq!(h.scheduler.pending(), 1);

    h.scheduler.advance(DEFAULT_NOTIFY_DELAY * 2);
    assert_eq!(h.log.borrow().verdicts, [false, false]);
}

#[test]
fn no_op_full_validation_keeps_running_window() {
    let h = harness();
    let _ = h.manager.validate(&ValidateOptions::default());
    h.scheduler.advance(DEFAULT_NOTIFY_DELAY);
    let settled = h.log.borrow().verdicts.len();

    let _ = h
        .manager
        .set_value_with("First", Some("Ada".into()), SetValueOptions::validate())
        .unwrap();
    h.scheduler.advance(DEFAULT_NOTIFY_DELAY / 2);

    // Nothing changes, so only the immediate verdict is added.
    let _ = h.manager.validate(&ValidateOptions::default());
    assert_eq!(h.log.borrow().verdicts.len(), settled + 1);

    h.scheduler.advance(DEFAULT_NOTIFY_DELAY / 2);
    assert_eq!(h.log.borrow().verdicts.len(), settled + 2);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn value_callback_skips_unchanged_values() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    let _ = h
        .manager
        .set_value_with("First", None, SetValueOptions::default())
        .unwrap();

    let log = h.log.borrow();
    assert_eq!(
        log.values,
        [
            ("First".to_owned(), Some(Value::from("Ada"))),
            ("First".to_owned(), None),
        ]
    );
}

#[test]
fn field_state_callback_tracks_transitions() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    let _ = h.manager.validate_field("First", &ValidateOptions::default()).unwrap();
    let _ = h.manager.validate_field("First", &ValidateOptions::default()).unwrap();

    let log = h.log.borrow();
    assert_eq!(
        log.states,
        [
            ("First".to_owned(), ValidationStatus::NeedsValidation),
            ("First".to_owned(), ValidationStatus::Valid),
        ]
    );
}

#[test]
fn config_callback_receives_every_field() {
    let h = harness();
    h.manager
        .apply_config(
            vec![FieldConfig::property("Middle")],
            &MergeMode::Replace,
            Vec::new(),
        )
        .unwrap();
    h.manager.remove_field("First").unwrap();
    assert_eq!(h.log.borrow().configs, [3, 2]);
}

#[test]
fn quiet_operations_notify_nobody() {
    let h = harness();
    let _ = h
        .manager
        .set_value_with("First", Some("Ada".into()), SetValueOptions::validate().quiet())
        .unwrap();
    let _ = h.manager.validate(&ValidateOptions::default().quiet());
    h.manager.set_business_logic_errors(
        vec![fieldcheck::BusinessLogicError::new("Server says no")],
        true,
    );
    h.scheduler.advance(DEFAULT_NOTIFY_DELAY);

    let log = h.log.borrow();
    assert!(log.verdicts.is_empty());
    assert!(log.states.is_empty());
    assert!(log.values.is_empty());
    assert!(!h.manager.is_valid());
}

#[test]
fn dispose_cancels_and_silences() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    assert_eq!(h.scheduler.pending(), 1);

    h.manager.dispose();
    assert!(h.manager.is_disposed());
    assert_eq!(h.scheduler.pending(), 0);

    let _ = h.manager.set_value("Last", "Lovelace").unwrap();
    let _ = h.manager.validate(&ValidateOptions::default());
    h.scheduler.advance(DEFAULT_NOTIFY_DELAY);

    let log = h.log.borrow();
    assert!(log.verdicts.is_empty());
    assert_eq!(log.values.len(), 1);
}

#[test]
fn dropping_manager_orphans_scheduled_verdict() {
    let h = harness();
    let _ = h.manager.set_value("First", "Ada").unwrap();
    let Harness {
        manager,
        scheduler,
        log,
    } = h;
    drop(manager);

    scheduler.advance(DEFAULT_NOTIFY_DELAY);
    assert!(log.borrow().verdicts.is_empty());
}

#[test]
fn zero_delay_notifies_synchronously() {
    let log = Rc::new(RefCell::new(Log::default()));
    let manager = wired(
        ValidationManager::builder(Services::default())
            .fields(fields())
            .notify_delay(Duration::ZERO),
        &log,
    )
    .build()
    .unwrap();

    let _ = manager.set_value("First", "Ada").unwrap();
    let _ = manager.set_value("Last", "Lovelace").unwrap();
    assert_eq!(log.borrow().verdicts.len(), 2);
}
