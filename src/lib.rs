//! Field validation orchestration.
//!
//! Fields are configured with [`FieldConfig`], in code or through the text
//! format in [`parse`], and run by a [`ValidationManager`] that tracks each
//! field's state, evaluates its rules (synchronously or asynchronously),
//! folds in business-logic errors and reports one [`ValidationVerdict`].

mod compile;
pub mod condition;
mod error;
mod manager;
mod merge;
pub mod parse;
pub mod scheduler;
#[cfg(feature = "binary-snapshot")]
pub mod serial;
mod services;
mod types;
mod validator;
mod value_host;

pub use compile::BUSINESS_LOGIC_FIELD;
pub use condition::{
    BuiltinConditionFactory, Condition, ConditionCategory, ConditionFactory, Evaluation,
    EvaluationTarget, ValueResolver,
};
pub use error::Error;
pub use manager::{
    CalculatedField, FieldHandle, FieldRef, InputField, PendingValidation, PropertyField,
    StaticField, ValidationManager, ValidationManagerBuilder, DEFAULT_NOTIFY_DELAY,
};
pub use merge::{MergeMode, RemoveSet};
pub use scheduler::{CancelHandle, ImmediateScheduler, ManualScheduler, Scheduler};
pub use services::{
    BasicConverter, DefaultComparer, MapLocalizer, MessageFormatter, Services, TextLocalizer,
    TokenFormatter, ValueComparer, ValueConverter,
};
pub use types::{
    BusinessLogicError, Calculation, CompareOp, ConditionCreator, ConditionDescriptor,
    ConditionError, ConditionResult, ConfigError, Dynamic, DynamicContext, FieldConfig, FieldKind,
    FieldState, IssueFound, ManagerSnapshot, ManagerState, MissingCodeBehavior, RuleConfig,
    SetValueOptions, Severity, ValidateOptions, ValidationError, ValidationStatus,
    ValidationVerdict, ValidatorOutcome, Value, ValueHostValidateResult,
};
pub use validator::{OverrideChange, ValidatorOverride, ValidatorOverrideChanges};
