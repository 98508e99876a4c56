//! Centralized error handling for Tablecode.
//!
//! Every failure in the library surfaces as a [`TablecodeError`] carrying the field path
//! where it happened, so a caller can locate the offending column in a deeply nested
//! record (for example `Outer.q.z`). Nothing is swallowed or coerced to a default value,
//! and a batch-level call either fully succeeds or fails as a whole.
//!
//! ## Error Categories
//!
//! - **Schema Resolution** ([`TablecodeError::SchemaResolution`]): a field type that cannot
//!   be mapped to a column (no codec, non-string map keys, cyclic record graph, ...).
//! - **Codec Conflict** ([`TablecodeError::CodecConflict`]): a second codec registered for
//!   the same key.
//! - **Serialization** ([`TablecodeError::Serialization`]): a runtime value that does not fit
//!   its declared kind, or a codec that failed to encode.
//! - **Deserialization** ([`TablecodeError::Deserialization`]): a table whose schema does not
//!   match the record type, or a codec that failed to decode.
//!
//! ## Usage Patterns
//!
//! ```rust
//! use tablecode::{Tablecode, TablecodeError, types::{DeclaredType, OpaqueType, RecordType}};
//!
//! let engine = Tablecode::new();
//! let record = RecordType::builder("Sample")
//!     .field("blob", DeclaredType::Opaque(OpaqueType::new("Unregistered")))
//!     .build();
//!
//! match engine.register_record_type(&record) {
//!     Err(TablecodeError::SchemaResolution { path, .. }) => assert_eq!(path.to_string(), "Sample.blob"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use crate::codec::CodecKey;
use crate::types::FieldPath;
use thiserror::Error;

/// A specialized `Result` type for Tablecode operations.
pub type Result<T> = std::result::Result<T, TablecodeError>;

/// Failure reported by a [`Codec`](crate::codec::Codec) implementation.
///
/// Codecs know nothing about field paths; the serializer and deserializer wrap this
/// error into the matching [`TablecodeError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
}

impl CodecError {
    /// Creates a codec error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The master error enum covering all failure domains in Tablecode.
///
/// The type is `Clone` so a failure captured on a worker thread can be handed back to
/// the caller untouched.
#[derive(Debug, Clone, Error)]
pub enum TablecodeError {
    /// A declared field type cannot be turned into a column.
    ///
    /// ## Common Causes
    ///
    /// - Opaque type with no registered codec
    /// - Mapping whose key kind is not a string
    /// - Record type that (transitively) contains itself
    /// - Duplicate field names, or a record with no fields at all
    #[error("Schema Resolution Error at '{path}': {reason}")]
    SchemaResolution {
        /// Path of the offending field.
        path: FieldPath,
        /// Human readable cause.
        reason: String,
    },

    /// A codec is already registered under this key.
    #[error("Codec Conflict Error: a codec is already registered for {key}")]
    CodecConflict {
        /// The key that was registered twice.
        key: CodecKey,
    },

    /// A record value could not be written into its column.
    #[error("Serialization Error at '{path}': {reason}")]
    Serialization {
        /// Path of the offending field.
        path: FieldPath,
        /// Human readable cause.
        reason: String,
        /// Codec failure, when the error came from `Codec::encode`.
        #[source]
        source: Option<CodecError>,
    },

    /// A table could not be read back into record values.
    #[error("Deserialization Error at '{path}': {reason}")]
    Deserialization {
        /// Path of the offending field.
        path: FieldPath,
        /// Human readable cause.
        reason: String,
        /// Codec failure, when the error came from `Codec::decode`.
        #[source]
        source: Option<CodecError>,
    },
}

impl TablecodeError {
    pub(crate) fn resolution(path: &FieldPath, reason: impl Into<String>) -> Self {
        Self::SchemaResolution {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn serialization(path: &FieldPath, reason: impl Into<String>) -> Self {
        Self::Serialization {
            path: path.clone(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn deserialization(path: &FieldPath, reason: impl Into<String>) -> Self {
        Self::Deserialization {
            path: path.clone(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Returns the field path the error points at, if the variant carries one.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::SchemaResolution { path, .. }
            | Self::Serialization { path, .. }
            | Self::Deserialization { path, .. } => Some(path),
            Self::CodecConflict { .. } => None,
        }
    }
}
