//! Collaborators the manager consumes through narrow interfaces.
//!
//! A [`Services`] value is handed to the manager at construction and passed
//! down to every host and validator; nothing is looked up globally.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::condition::{BuiltinConditionFactory, ConditionFactory};
use crate::scheduler::{ImmediateScheduler, Scheduler};
use crate::types::Value;

/// Substitutes `{Token}` placeholders in message templates.
pub trait MessageFormatter: Send + Sync {
    fn format(&self, template: &str, tokens: &[(String, String)]) -> String;
}

/// Replaces `{Name}` with the value of the matching token. Unknown tokens
/// are left as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenFormatter;

impl MessageFormatter for TokenFormatter {
    fn format(&self, template: &str, tokens: &[(String, String)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match tokens.iter().find(|(k, _)| k == name) {
                        Some((_, v)) => out.push_str(v),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Looks up localized text by key and culture.
pub trait TextLocalizer: Send + Sync {
    fn localize(&self, key: &str, culture: &str) -> Option<String>;
}

/// In-memory localizer. Falls back from `"en-US"` to `"en"` when the full
/// culture has no entry.
#[derive(Debug, Clone, Default)]
pub struct MapLocalizer {
    entries: HashMap<(String, String), String>,
}

impl MapLocalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, culture: &str, key: &str, text: &str) -> Self {
        self.entries
            .insert((culture.to_owned(), key.to_owned()), text.to_owned());
        self
    }
}

impl TextLocalizer for MapLocalizer {
    fn localize(&self, key: &str, culture: &str) -> Option<String> {
        let lookup = |c: &str| self.entries.get(&(c.to_owned(), key.to_owned())).cloned();
        lookup(culture).or_else(|| {
            let (language, _) = culture.split_once('-')?;
            lookup(language)
        })
    }
}

/// Converts the raw text of an input field into a native value.
pub trait ValueConverter: Send + Sync {
    /// `Ok(None)` means the text is blank.
    ///
    /// # Errors
    ///
    /// Returns a user-facing reason when the text does not fit `data_type`.
    fn convert(&self, text: &str, data_type: Option<&str>) -> Result<Option<Value>, String>;
}

/// Handles `"integer"`, `"float"`, `"boolean"` and `"string"`. Any other
/// data type keeps the text as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConverter;

impl ValueConverter for BasicConverter {
    fn convert(&self, text: &str, data_type: Option<&str>) -> Result<Option<Value>, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match data_type {
            Some("integer") => trimmed
                .parse::<i64>()
                .map(|n| Some(Value::Int(n)))
                .map_err(|_| format!("'{trimmed}' is not a whole number")),
            Some("float") => trimmed
                .parse::<f64>()
                .map(|n| Some(Value::Float(n)))
                .map_err(|_| format!("'{trimmed}' is not a number")),
            Some("boolean") => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Some(Value::Bool(true))),
                "false" | "no" => Ok(Some(Value::Bool(false))),
                _ => Err(format!("'{trimmed}' is not yes or no")),
            },
            Some("string") | None => Ok(Some(Value::String(text.to_owned()))),
            Some(other) => {
                debug!(data_type = other, "no converter for data type, keeping text");
                Ok(Some(Value::String(text.to_owned())))
            }
        }
    }
}

/// Ordering used by comparison conditions.
pub trait ValueComparer: Send + Sync {
    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering>;
}

/// Numeric, string, boolean and element-wise list ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparer;

impl ValueComparer for DefaultComparer {
    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        a.partial_cmp_value(b)
    }
}

/// The service bundle.
#[derive(Clone)]
pub struct Services {
    pub condition_factory: Arc<dyn ConditionFactory>,
    pub message_formatter: Arc<dyn MessageFormatter>,
    pub localizer: Arc<dyn TextLocalizer>,
    pub converter: Arc<dyn ValueConverter>,
    pub comparer: Arc<dyn ValueComparer>,
    pub scheduler: Rc<dyn Scheduler>,
    /// Culture passed to the localizer, e.g. `"en-US"`.
    pub culture: String,
}

impl Default for Services {
    /// Built-in catalogue, `{Token}` formatting, an empty localizer and an
    /// [`ImmediateScheduler`] (no coalescing delay).
    fn default() -> Self {
        Self {
            condition_factory: Arc::new(BuiltinConditionFactory::new()),
            message_formatter: Arc::new(TokenFormatter),
            localizer: Arc::new(MapLocalizer::new()),
            converter: Arc::new(BasicConverter),
            comparer: Arc::new(DefaultComparer),
            scheduler: Rc::new(ImmediateScheduler),
            culture: "en".to_owned(),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("culture", &self.culture)
            .finish_non_exhaustive()
    }
}

impl Services {
    #[must_use]
    pub fn with_condition_factory(mut self, factory: impl ConditionFactory + 'static) -> Self {
        self.condition_factory = Arc::new(factory);
        self
    }

    #[must_use]
    pub fn with_localizer(mut self, localizer: impl TextLocalizer + 'static) -> Self {
        self.localizer = Arc::new(localizer);
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_culture(mut self, culture: &str) -> Self {
        culture.clone_into(&mut self.culture);
        self
    }
}
