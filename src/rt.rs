// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use crate::error::{Result, TablecodeError};
use crate::record::{FieldValue, Record};
use crate::types::{DeclaredType, FieldPath, RecordRef};
use crate::value::{RecordValue, Value};
use std::any::Any;
use std::fmt;

/// Hands out the fields of a record value by name, each at most once.
#[derive(Debug)]
pub struct FieldReader<'p> {
    slots: Vec<Option<(String, Value)>>,
    path: &'p FieldPath,
}

impl<'p> FieldReader<'p> {
    /// Wraps the record read at `path`.
    pub fn new(record: RecordValue, path: &'p FieldPath) -> Self {
        Self {
            slots: record.into_fields().into_iter().map(Some).collect(),
            path,
        }
    }

    /// Takes the field declared at `index` under `name` and converts it.
    pub fn take<T: FieldValue>(&mut self, index: usize, name: &str) -> Result<T> {
        let field_path = self.path.child(name);
        let slot = match self.slots.get(index) {
            Some(Some((n, _))) if n == name => Some(index),
            _ => self
                .slots
                .iter()
                .position(|s| matches!(s, Some((n, _)) if n == name)),
        };
        let value = slot
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take)
            .map(|(_, value)| value)
            .ok_or_else(|| TablecodeError::deserialization(&field_path, "missing field"))?;
        T::from_value(value, &field_path)
    }
}

/// Declared type of a field holding a derived record. The descriptor is built lazily.
pub fn record_declared_type<R: Record>() -> DeclaredType {
    DeclaredType::Record(RecordRef::lazy(R::type_key(), R::record_type))
}

/// Converts a field value holding a derived record.
pub fn record_from_value<R: Record>(value: Value, path: &FieldPath) -> Result<R> {
    match value {
        Value::Record(record) => R::from_record(record, path),
        other => Err(type_mismatch(path, "record", &other)),
    }
}

/// Unwraps an opaque value of type `T`.
pub fn take_opaque<T: Any + Send + Sync + Clone>(value: Value, path: &FieldPath) -> Result<T> {
    match value {
        Value::Opaque(opaque) => opaque.into_inner::<T>().map_err(|opaque| {
            TablecodeError::deserialization(
                path,
                format!(
                    "expected opaque {}, found {}",
                    std::any::type_name::<T>(),
                    opaque.type_name()
                ),
            )
        }),
        other => Err(type_mismatch(path, std::any::type_name::<T>(), &other)),
    }
}

/// A value whose shape does not match the Rust field type.
pub fn type_mismatch(path: &FieldPath, expected: &str, found: &Value) -> TablecodeError {
    TablecodeError::deserialization(
        path,
        format!("expected {expected} value, found {}", found.kind_name()),
    )
}

/// A stored integer that does not fit the Rust field type.
pub fn out_of_range(path: &FieldPath, value: impl fmt::Display, target: &str) -> TablecodeError {
    TablecodeError::deserialization(path, format!("value {value} does not fit in {target}"))
}
