//! Type vocabulary of the engine.
//!
//! This module defines the caller-facing record descriptors, the identity keys schemas
//! are cached under, and the resolved field-type tree that the schema builder consumes.

/// Declared record descriptors (`RecordType`, `DeclaredType`).
pub mod descriptor;
/// Defines the `TypeKey` type.
pub mod id;
/// Defines `PrimitiveKind`.
pub mod kind;
/// Defines `FieldPath`.
pub mod path;
/// Resolved field-type tree.
pub mod resolved;

pub use descriptor::{DeclaredType, FieldDecl, OpaqueType, RecordRef, RecordType, RecordTypeBuilder};
pub use id::TypeKey;
pub use kind::PrimitiveKind;
pub use path::FieldPath;
pub use resolved::{FieldTypeNode, ResolvedField, ResolvedRecord};
