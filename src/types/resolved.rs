use super::id::TypeKey;
use super::kind::PrimitiveKind;
use crate::codec::CodecHandle;

/// A record type after resolution: every field has a canonical [`FieldTypeNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    /// Identity of the originating record type.
    pub key: TypeKey,
    /// Display name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<ResolvedField>,
}

/// A resolved `(name, node)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Column name.
    pub name: String,
    /// Resolved type.
    pub node: FieldTypeNode,
}

/// Canonical field type tree produced by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTypeNode {
    /// Native scalar.
    Primitive(PrimitiveKind),
    /// Nested record.
    Nested(ResolvedRecord),
    /// String-keyed mapping.
    Mapping {
        /// Key kind, always `Utf8` after resolution.
        key: PrimitiveKind,
        /// Value type.
        value: Box<FieldTypeNode>,
    },
    /// Variable-length list.
    List(Box<FieldTypeNode>),
    /// Value stored as bytes through the referenced codec.
    OpaqueBinary(CodecHandle),
}
