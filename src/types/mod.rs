mod config;
mod error;
mod evaluation_report;
mod field_registry;
mod issue;
mod options;
mod state;
mod status;
mod value;
mod verdict;

pub use config::{
    Calculation, ConditionCreator, ConditionDescriptor, Dynamic, DynamicContext, FieldConfig,
    FieldKind, RuleConfig,
};
pub use error::{ConditionError, ConfigError, ValidationError};
pub use evaluation_report::{ValidatorOutcome, ValueHostValidateResult};
pub use field_registry::FieldRegistry;
pub(crate) use issue::upsert_issue;
pub use issue::{BusinessLogicError, IssueFound};
pub use options::{MissingCodeBehavior, SetValueOptions, ValidateOptions};
pub use state::{FieldState, ManagerSnapshot, ManagerState};
pub use status::{ConditionResult, Severity, ValidationStatus};
pub use value::{same_value, CompareOp, Value};
pub use verdict::ValidationVerdict;
