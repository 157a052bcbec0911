//! Binary form of a [`ManagerSnapshot`](crate::ManagerSnapshot).
//!
//! A 32-byte fixed header followed by a bincode-encoded payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"FCHK"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! ## Versioning
//!
//! The format version in the header must match exactly; otherwise decoding
//! fails with [`DeserializeError::IncompatibleVersion`]. The engine version
//! is informational only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    FieldState, IssueFound, ManagerSnapshot, ManagerState, Severity, ValidationStatus, Value,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"FCHK";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when encoding a snapshot.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("snapshot payload of {0} bytes exceeds the 4 GiB format limit")]
    TooLarge(usize),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when decoding a snapshot.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a fieldcheck snapshot: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
//
// bincode needs a fixed layout: no untagged enums, no skipped fields.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedSnapshot {
    metadata: SnapshotMetadata,
    fields: Vec<SerializedFieldState>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMetadata {
    field_count: usize,
    generated_code_seed: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedFieldState {
    name: String,
    value: Option<SerializedValue>,
    input_value: Option<String>,
    conversion_error: Option<String>,
    status: ValidationStatus,
    issues_found: Vec<SerializedIssue>,
    business_logic_errors: Vec<SerializedIssue>,
    async_processing: bool,
    corrected: bool,
    enabled: Option<bool>,
    last_outcome: Option<ValidationStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedIssue {
    field: String,
    error_code: String,
    severity: Severity,
    error_message: String,
    summary_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SerializedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<SerializedValue>),
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn serialize_value(value: &Value) -> SerializedValue {
    match value {
        Value::Int(v) => SerializedValue::Int(*v),
        Value::Float(v) => SerializedValue::Float(*v),
        Value::Bool(v) => SerializedValue::Bool(*v),
        Value::String(v) => SerializedValue::Str(v.clone()),
        Value::List(items) => SerializedValue::List(items.iter().map(serialize_value).collect()),
    }
}

fn deserialize_value(value: SerializedValue) -> Value {
    match value {
        SerializedValue::Int(v) => Value::Int(v),
        SerializedValue::Float(v) => Value::Float(v),
        SerializedValue::Bool(v) => Value::Bool(v),
        SerializedValue::Str(v) => Value::String(v),
        SerializedValue::List(items) => Value::List(items.into_iter().map(deserialize_value).collect()),
    }
}

fn serialize_issue(issue: &IssueFound) -> SerializedIssue {
    SerializedIssue {
        field: issue.field.clone(),
        error_code: issue.error_code.clone(),
        severity: issue.severity,
        error_message: issue.error_message.clone(),
        summary_message: issue.summary_message.clone(),
    }
}

fn deserialize_issue(issue: SerializedIssue) -> IssueFound {
    IssueFound {
        field: issue.field,
        error_code: issue.error_code,
        severity: issue.severity,
        error_message: issue.error_message,
        summary_message: issue.summary_message,
    }
}

fn snapshot_to_serialized(snapshot: &ManagerSnapshot) -> SerializedSnapshot {
    let fields = snapshot
        .field_states
        .iter()
        .map(|s| SerializedFieldState {
            name: s.name.clone(),
            value: s.value.as_ref().map(serialize_value),
            input_value: s.input_value.clone(),
            conversion_error: s.conversion_error.clone(),
            status: s.status,
            issues_found: s.issues_found.iter().map(serialize_issue).collect(),
            business_logic_errors: s.business_logic_errors.iter().map(serialize_issue).collect(),
            async_processing: s.async_processing,
            corrected: s.corrected,
            enabled: s.enabled,
            last_outcome: s.last_outcome,
        })
        .collect();

    SerializedSnapshot {
        metadata: SnapshotMetadata {
            field_count: snapshot.field_states.len(),
            generated_code_seed: snapshot.manager_state.generated_code_seed,
        },
        fields,
    }
}

fn serialized_to_snapshot(ser: SerializedSnapshot) -> Result<ManagerSnapshot, DeserializeError> {
    validate(&ser)?;

    let field_states = ser
        .fields
        .into_iter()
        .map(|s| FieldState {
            name: s.name,
            value: s.value.map(deserialize_value),
            input_value: s.input_value,
            conversion_error: s.conversion_error,
            status: s.status,
            issues_found: s.issues_found.into_iter().map(deserialize_issue).collect(),
            business_logic_errors: s
                .business_logic_errors
                .into_iter()
                .map(deserialize_issue)
                .collect(),
            async_processing: s.async_processing,
            corrected: s.corrected,
            enabled: s.enabled,
            last_outcome: s.last_outcome,
        })
        .collect();

    Ok(ManagerSnapshot {
        manager_state: ManagerState {
            generated_code_seed: ser.metadata.generated_code_seed,
        },
        field_states,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedSnapshot) -> Result<(), DeserializeError> {
    if ser.metadata.field_count != ser.fields.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} fields but payload has {}",
            ser.metadata.field_count,
            ser.fields.len()
        )));
    }

    let mut seen = HashSet::new();
    for field in &ser.fields {
        if field.name.is_empty() {
            return Err(DeserializeError::Validation("empty field name".to_owned()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(DeserializeError::Validation(format!(
                "field '{}' appears more than once",
                field.name
            )));
        }
        if field.status == ValidationStatus::Disabled {
            return Err(DeserializeError::Validation(format!(
                "field '{}' stores the derived status 'disabled'",
                field.name
            )));
        }
        validate_issues(&field.name, &field.issues_found)?;
        validate_issues(&field.name, &field.business_logic_errors)?;
    }
    Ok(())
}

fn validate_issues(field: &str, issues: &[SerializedIssue]) -> Result<(), DeserializeError> {
    let mut codes = HashSet::new();
    for issue in issues {
        if issue.field != field {
            return Err(DeserializeError::Validation(format!(
                "issue '{}' on field '{field}' names field '{}'",
                issue.error_code, issue.field
            )));
        }
        if !codes.insert(issue.error_code.as_str()) {
            return Err(DeserializeError::Validation(format!(
                "error code '{}' repeated on field '{field}'",
                issue.error_code
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8], payload_len: u32) {
    let hash = blake3::hash(payload);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash.as_bytes()[..16]);
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] engine version, bytes[8..12] flags
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(snapshot: &ManagerSnapshot) -> Result<Vec<u8>, SerializeError> {
    let serialized = snapshot_to_serialized(snapshot);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| SerializeError::TooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload, payload_len);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<ManagerSnapshot, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() < payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];

    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedSnapshot, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

    serialized_to_snapshot(serialized)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
