//! Type resolution: declared record descriptors to canonical field-type trees.
//!
//! The resolver walks a [`RecordType`] depth first and produces a [`ResolvedRecord`]
//! in which every opaque field already carries the codec it will be stored with. All
//! user-facing schema errors are raised here, before any column is built, and each one
//! names the field path that caused it.

use crate::codec::CodecRegistry;
use crate::error::{Result, TablecodeError};
use crate::types::{
    DeclaredType, FieldPath, FieldTypeNode, PrimitiveKind, RecordType, ResolvedField,
    ResolvedRecord, TypeKey,
};
use std::collections::HashSet;

/// Resolves record descriptors against a codec registry.
#[derive(Debug)]
pub struct TypeResolver<'r> {
    registry: &'r CodecRegistry,
}

impl<'r> TypeResolver<'r> {
    /// Creates a resolver reading from `registry`.
    pub fn new(registry: &'r CodecRegistry) -> Self {
        Self { registry }
    }

    /// Resolves a record type and everything it references.
    ///
    /// # Errors
    /// Returns [`TablecodeError::SchemaResolution`] for duplicate or missing fields,
    /// non-string map keys, opaque types without a codec, and cyclic record graphs.
    pub fn resolve(&self, record: &RecordType) -> Result<ResolvedRecord> {
        let mut visiting = Vec::new();
        self.resolve_record(record, &FieldPath::root(record.name()), &mut visiting)
    }

    fn resolve_record(
        &self,
        record: &RecordType,
        path: &FieldPath,
        visiting: &mut Vec<TypeKey>,
    ) -> Result<ResolvedRecord> {
        if visiting.contains(record.key()) {
            return Err(TablecodeError::resolution(
                path,
                format!("cyclic record type: '{}' contains itself", record.key()),
            ));
        }
        if record.fields().is_empty() {
            return Err(TablecodeError::resolution(
                path,
                format!("record type '{}' declares no fields", record.name()),
            ));
        }

        visiting.push(record.key().clone());
        let fields = self.resolve_fields(record, path, visiting);
        visiting.pop();

        Ok(ResolvedRecord {
            key: record.key().clone(),
            name: record.name().to_string(),
            fields: fields?,
        })
    }

    fn resolve_fields(
        &self,
        record: &RecordType,
        path: &FieldPath,
        visiting: &mut Vec<TypeKey>,
    ) -> Result<Vec<ResolvedField>> {
        let mut seen = HashSet::with_capacity(record.fields().len());
        let mut fields = Vec::with_capacity(record.fields().len());
        for decl in record.fields() {
            let field_path = path.child(&decl.name);
            if !seen.insert(decl.name.as_str()) {
                return Err(TablecodeError::resolution(
                    &field_path,
                    format!("duplicate field name '{}'", decl.name),
                ));
            }
            let node = self.resolve_type(&decl.ty, &field_path, visiting)?;
            fields.push(ResolvedField {
                name: decl.name.clone(),
                node,
            });
        }
        Ok(fields)
    }

    fn resolve_type(
        &self,
        ty: &DeclaredType,
        path: &FieldPath,
        visiting: &mut Vec<TypeKey>,
    ) -> Result<FieldTypeNode> {
        match ty {
            DeclaredType::Primitive(kind) => Ok(FieldTypeNode::Primitive(*kind)),
            DeclaredType::Record(reference) => {
                // Checked before loading so a lazy self-reference is never expanded.
                if visiting.contains(reference.key()) {
                    return Err(TablecodeError::resolution(
                        path,
                        format!("cyclic record type: '{}' contains itself", reference.key()),
                    ));
                }
                let nested = reference.load();
                self.resolve_record(&nested, path, visiting)
                    .map(FieldTypeNode::Nested)
            }
            DeclaredType::Map { key, value } => {
                if *key != PrimitiveKind::Utf8 {
                    return Err(TablecodeError::resolution(
                        path,
                        format!("map keys must be utf8, found {key}"),
                    ));
                }
                let value = self.resolve_type(value, &path.element("value"), visiting)?;
                Ok(FieldTypeNode::Mapping {
                    key: *key,
                    value: Box::new(value),
                })
            }
            DeclaredType::List(element) => {
                let element = self.resolve_type(element, &path.element("item"), visiting)?;
                Ok(FieldTypeNode::List(Box::new(element)))
            }
            DeclaredType::Opaque(opaque) => match self.registry.lookup(opaque) {
                Some(handle) => Ok(FieldTypeNode::OpaqueBinary(handle)),
                None => Err(TablecodeError::resolution(
                    path,
                    format!("no codec registered for type '{opaque}'"),
                )),
            },
        }
    }
}
