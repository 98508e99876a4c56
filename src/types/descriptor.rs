//! Caller-declared record descriptors.
//!
//! A [`RecordType`] is the explicit, ordered declaration of a record's fields. It is
//! written by hand or generated by `#[derive(TableRecord)]`, and is the only input the
//! type resolver needs: nothing is discovered by reflection.

use super::id::TypeKey;
use super::kind::PrimitiveKind;
use std::fmt;
use std::sync::Arc;

/// Explicit, ordered declaration of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    key: TypeKey,
    name: String,
    fields: Vec<FieldDecl>,
}

impl RecordType {
    /// Starts a descriptor whose key is its name.
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder {
        let name = name.into();
        RecordTypeBuilder {
            key: TypeKey::new(&name),
            name,
            fields: Vec::new(),
        }
    }

    /// Starts a descriptor with an explicit identity key.
    pub fn builder_with_key(key: impl Into<TypeKey>, name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            key: key.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Identity used for schema caching.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Display name, used as the first segment of field paths.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in order.
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }
}

/// Builder for [`RecordType`].
#[derive(Debug)]
pub struct RecordTypeBuilder {
    key: TypeKey,
    name: String,
    fields: Vec<FieldDecl>,
}

impl RecordTypeBuilder {
    /// Appends a field. Order of calls is column order.
    pub fn field(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
        });
        self
    }

    /// Finishes the descriptor.
    ///
    /// Field names are validated when the type is resolved, not here.
    pub fn build(self) -> RecordType {
        RecordType {
            key: self.key,
            name: self.name,
            fields: self.fields,
        }
    }
}

/// One declared `(name, type)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: DeclaredType,
}

/// The type a caller declares for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    /// A scalar with a native column kind.
    Primitive(PrimitiveKind),
    /// A nested record.
    Record(RecordRef),
    /// A homogeneous mapping. Only `Utf8` keys resolve.
    Map {
        /// Key kind.
        key: PrimitiveKind,
        /// Value type.
        value: Box<DeclaredType>,
    },
    /// A variable-length list.
    List(Box<DeclaredType>),
    /// A type without a native column shape, stored through a registered codec.
    Opaque(OpaqueType),
}

impl DeclaredType {
    /// 64-bit signed integer.
    pub const INT: DeclaredType = DeclaredType::Primitive(PrimitiveKind::Int64);
    /// 64-bit float.
    pub const FLOAT: DeclaredType = DeclaredType::Primitive(PrimitiveKind::Float64);
    /// Boolean.
    pub const BOOL: DeclaredType = DeclaredType::Primitive(PrimitiveKind::Bool);
    /// UTF-8 string.
    pub const STRING: DeclaredType = DeclaredType::Primitive(PrimitiveKind::Utf8);
    /// Native byte string.
    pub const BYTES: DeclaredType = DeclaredType::Primitive(PrimitiveKind::Binary);

    /// A string-keyed mapping.
    pub fn map(value: DeclaredType) -> Self {
        Self::Map {
            key: PrimitiveKind::Utf8,
            value: Box::new(value),
        }
    }

    /// A list of `element`.
    pub fn list(element: DeclaredType) -> Self {
        Self::List(Box::new(element))
    }

    /// A nested record declared inline.
    pub fn record(record: RecordType) -> Self {
        Self::Record(RecordRef::new(record))
    }

    /// An opaque type by name.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self::Opaque(OpaqueType::new(name))
    }
}

/// Reference to a nested record's descriptor.
///
/// A lazy reference only materializes the descriptor when the resolver walks into it,
/// which is what lets a self-referential type be declared at all (and then rejected
/// as a cycle).
#[derive(Clone)]
pub struct RecordRef {
    key: TypeKey,
    source: RecordSource,
}

#[derive(Clone)]
enum RecordSource {
    Eager(Arc<RecordType>),
    Lazy(fn() -> RecordType),
}

impl RecordRef {
    /// Wraps an already built descriptor.
    pub fn new(record: RecordType) -> Self {
        Self {
            key: record.key().clone(),
            source: RecordSource::Eager(Arc::new(record)),
        }
    }

    /// Defers building the descriptor until resolution.
    pub fn lazy(key: TypeKey, describe: fn() -> RecordType) -> Self {
        Self {
            key,
            source: RecordSource::Lazy(describe),
        }
    }

    /// Identity of the referenced record.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Returns the referenced descriptor.
    pub fn load(&self) -> Arc<RecordType> {
        match &self.source {
            RecordSource::Eager(record) => Arc::clone(record),
            RecordSource::Lazy(describe) => Arc::new(describe()),
        }
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.source {
            RecordSource::Eager(_) => "eager",
            RecordSource::Lazy(_) => "lazy",
        };
        write!(f, "RecordRef({}, {mode})", self.key)
    }
}

/// Name of a type handled by a codec, e.g. `NdArray` or `Matrix<f32>`.
///
/// The part before the first `<` is the type's family, used as the codec fallback key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueType {
    name: String,
}

impl OpaqueType {
    /// Creates an opaque type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Full type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generic base name.
    pub fn family(&self) -> &str {
        match self.name.split_once('<') {
            Some((base, _)) => base.trim(),
            None => self.name.trim(),
        }
    }
}

impl fmt::Display for OpaqueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
