//! Text format for field configurations.
//!
//! ```text
//! # comments run to the end of the line
//! static Country = "NZ"
//! input Age: integer {
//!     label "Your age"
//!     rule Require
//!     rule Compare(op = >=, value = 18) {
//!         code "ADULT"
//!         severity warning
//!         message "{Label} must be at least {CompareTo}."
//!     }
//! }
//! ```
//!
//! Calculated fields carry code and can only be built programmatically.

mod error;
mod grammar;
mod parser;

use std::path::Path;

pub use error::ParseError;
pub use parser::ParsedConfig;

use crate::FieldConfig;

/// Parse configuration text into a [`ParsedConfig`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid configuration text.
pub fn parse(input: &str) -> Result<ParsedConfig, ParseError> {
    use winnow::Parser;
    grammar::parse_config
        .parse(input)
        .map_err(|e| ParseError::new(e.offset(), e.inner().to_string()))
}

/// Read and parse a configuration file.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if the file cannot be read and
/// [`Error::Parse`](crate::Error::Parse) if its contents are malformed.
pub fn load_fields(path: impl AsRef<Path>) -> Result<Vec<FieldConfig>, crate::Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse(&text)?.fields)
}
