use crate::FieldConfig;

/// The result of parsing configuration text.
#[derive(Debug, Default)]
pub struct ParsedConfig {
    /// Fields in the order they appear in the text.
    pub fields: Vec<FieldConfig>,
}

impl ParsedConfig {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }
}
