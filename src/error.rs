use thiserror::Error;

use crate::parse::ParseError;
use crate::{ConfigError, ValidationError};

/// Unified error type covering parsing, configuration, validation and I/O.
///
/// Returned by convenience functions like
/// [`load_fields`](crate::parse::load_fields) that cross more than one of
/// these concerns.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "binary-snapshot")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-snapshot")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
