//! The write side: record values to columnar tables.
//!
//! Serialization walks the schema tree one column at a time. For each node the values of
//! every row at that position are gathered, checked against the declared kind and turned
//! into one Arrow array, recursing into struct, map and list children. Opaque columns
//! are the only place user code runs; once a column is large enough the codec calls
//! fan out over the rayon pool.
//!
//! A batch is all-or-nothing: the first failing value aborts the call and no partial
//! table is returned.

use crate::Table;
use crate::codec::CodecHandle;
use crate::constants::DEFAULT_PARALLEL_THRESHOLD;
use crate::error::{Result, TablecodeError};
use crate::schema::{
    DerivedSchema, SchemaField, SchemaNode, list_item_field, map_entries_field, map_entry_fields,
    struct_fields,
};
use crate::types::{FieldPath, PrimitiveKind};
use crate::value::{OpaqueValue, RecordValue, Value};
use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, ListArray, MapArray, PrimitiveArray, StringArray,
    StructArray,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{
    ArrowPrimitiveType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use std::sync::Arc;

/// Tuning knobs shared by the serializer and the deserializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Minimum number of values in an opaque column before codec calls run in parallel.
    pub parallel_threshold: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

/// Serializes a batch of records into a table of `schema`.
///
/// # Errors
/// Returns [`TablecodeError::Serialization`] naming the first field whose value is
/// missing, undeclared, of the wrong kind, out of range for its declared width, or
/// rejected by its codec.
pub fn serialize(
    schema: &DerivedSchema,
    records: &[RecordValue],
    options: &SerializeOptions,
) -> Result<Table> {
    let path = FieldPath::root(schema.name());
    if records.is_empty() {
        return Ok(empty_table(schema));
    }

    let rows: Vec<&RecordValue> = records.iter().collect();
    let encoder = ColumnEncoder { options };
    let root = encoder.encode_struct(schema.fields(), &path, &rows)?;
    let table = RecordBatch::try_new(schema.arrow_schema(), vec![Arc::new(root) as ArrayRef])
        .map_err(|e| TablecodeError::serialization(&path, e.to_string()))?;

    tracing::debug!(record = schema.name(), rows = table.num_rows(), "serialized batch");
    Ok(table)
}

/// A zero-row table with exactly the schema of `schema`.
pub fn empty_table(schema: &DerivedSchema) -> Table {
    RecordBatch::new_empty(schema.arrow_schema())
}

struct ColumnEncoder<'o> {
    options: &'o SerializeOptions,
}

impl ColumnEncoder<'_> {
    fn encode_struct(
        &self,
        fields: &[SchemaField],
        path: &FieldPath,
        rows: &[&RecordValue],
    ) -> Result<StructArray> {
        for row in rows {
            if row.len() > fields.len() {
                check_declared(fields, path, row)?;
            }
        }

        let mut columns = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let child_path = path.child(&field.name);
            let values = rows
                .iter()
                .map(|row| {
                    row.get_declared(index, &field.name).ok_or_else(|| {
                        TablecodeError::serialization(&child_path, "missing value for declared field")
                    })
                })
                .collect::<Result<Vec<&Value>>>()?;
            columns.push(self.encode_column(&field.node, &child_path, &values)?);
        }

        StructArray::try_new(struct_fields(fields), columns, None)
            .map_err(|e| TablecodeError::serialization(path, e.to_string()))
    }

    fn encode_column(
        &self,
        node: &SchemaNode,
        path: &FieldPath,
        values: &[&Value],
    ) -> Result<ArrayRef> {
        match node {
            SchemaNode::Primitive(kind) => encode_primitive(*kind, path, values),
            SchemaNode::Struct(fields) => {
                let rows = values
                    .iter()
                    .map(|v| match v {
                        Value::Record(record) => Ok(record),
                        other => Err(mismatch(path, "record", other)),
                    })
                    .collect::<Result<Vec<&RecordValue>>>()?;
                Ok(Arc::new(self.encode_struct(fields, path, &rows)?))
            }
            SchemaNode::Map(value_node) => self.encode_map(value_node, path, values),
            SchemaNode::List(element) => self.encode_list(element, path, values),
            SchemaNode::Binary(handle) => self.encode_opaque(handle, path, values),
        }
    }

    fn encode_map(
        &self,
        value_node: &SchemaNode,
        path: &FieldPath,
        values: &[&Value],
    ) -> Result<ArrayRef> {
        let mut lengths = Vec::with_capacity(values.len());
        let mut keys = Vec::new();
        let mut items = Vec::new();
        for value in values {
            let Value::Map(entries) = value else {
                return Err(mismatch(path, "map", value));
            };
            lengths.push(entries.len());
            for (key, item) in entries {
                keys.push(key.as_str());
                items.push(item);
            }
        }

        let key_path = path.element("key");
        check_offset_range(&key_path, keys.iter().map(|k| k.len()).sum(), "bytes")?;
        let key_array: ArrayRef = Arc::new(StringArray::from_iter_values(keys));
        let value_array = self.encode_column(value_node, &path.element("value"), &items)?;
        let entries = StructArray::try_new(
            map_entry_fields(value_node.data_type()),
            vec![key_array, value_array],
            None,
        )
        .map_err(|e| TablecodeError::serialization(path, e.to_string()))?;

        let map = MapArray::try_new(
            map_entries_field(value_node.data_type()),
            offsets(path, lengths)?,
            entries,
            None,
            false,
        )
        .map_err(|e| TablecodeError::serialization(path, e.to_string()))?;
        Ok(Arc::new(map))
    }

    fn encode_list(
        &self,
        element: &SchemaNode,
        path: &FieldPath,
        values: &[&Value],
    ) -> Result<ArrayRef> {
        let mut lengths = Vec::with_capacity(values.len());
        let mut items = Vec::new();
        for value in values {
            let Value::List(elements) = value else {
                return Err(mismatch(path, "list", value));
            };
            lengths.push(elements.len());
            items.extend(elements.iter());
        }

        let child = self.encode_column(element, &path.element("item"), &items)?;
        let list = ListArray::try_new(
            list_item_field(element.data_type()),
            offsets(path, lengths)?,
            child,
            None,
        )
        .map_err(|e| TablecodeError::serialization(path, e.to_string()))?;
        Ok(Arc::new(list))
    }

    fn encode_opaque(
        &self,
        handle: &CodecHandle,
        path: &FieldPath,
        values: &[&Value],
    ) -> Result<ArrayRef> {
        let opaques = values
            .iter()
            .map(|v| match v {
                Value::Opaque(opaque) => Ok(opaque),
                other => Err(mismatch(path, "opaque", other)),
            })
            .collect::<Result<Vec<&OpaqueValue>>>()?;

        let encoded = if opaques.len() >= self.options.parallel_threshold {
            opaques
                .par_iter()
                .map(|v| handle.encode(v))
                .collect::<std::result::Result<Vec<_>, _>>()
        } else {
            opaques.iter().map(|v| handle.encode(v)).collect()
        };
        let blobs = encoded.map_err(|e| TablecodeError::Serialization {
            path: path.clone(),
            reason: format!("codec '{}' failed to encode", handle.name()),
            source: Some(e),
        })?;

        check_offset_range(path, blobs.iter().map(Vec::len).sum(), "bytes")?;
        Ok(Arc::new(BinaryArray::from_iter_values(blobs.iter())))
    }
}

fn check_declared(fields: &[SchemaField], path: &FieldPath, row: &RecordValue) -> Result<()> {
    for (name, _) in row.fields() {
        if !fields.iter().any(|f| f.name == *name) {
            return Err(TablecodeError::serialization(
                &path.child(name),
                "value for a field the record type does not declare",
            ));
        }
    }
    Err(TablecodeError::serialization(
        path,
        "record value repeats a field",
    ))
}

fn mismatch(path: &FieldPath, expected: &str, found: &Value) -> TablecodeError {
    TablecodeError::serialization(
        path,
        format!("expected {expected} value, found {}", found.kind_name()),
    )
}

/// Variable-length arrow columns address their children with `i32` offsets.
fn check_offset_range(path: &FieldPath, total: usize, unit: &str) -> Result<()> {
    if i32::try_from(total).is_err() {
        return Err(TablecodeError::serialization(
            path,
            format!("{total} {unit} exceed the 32-bit offset range"),
        ));
    }
    Ok(())
}

fn offsets(path: &FieldPath, lengths: Vec<usize>) -> Result<OffsetBuffer<i32>> {
    check_offset_range(path, lengths.iter().sum(), "container elements")?;
    Ok(OffsetBuffer::from_lengths(lengths))
}

// --- Primitive coercion ---

fn encode_primitive(kind: PrimitiveKind, path: &FieldPath, values: &[&Value]) -> Result<ArrayRef> {
    match kind {
        PrimitiveKind::Int8 => integers::<Int8Type>(kind, path, values),
        PrimitiveKind::Int16 => integers::<Int16Type>(kind, path, values),
        PrimitiveKind::Int32 => integers::<Int32Type>(kind, path, values),
        PrimitiveKind::Int64 => integers::<Int64Type>(kind, path, values),
        PrimitiveKind::UInt8 => integers::<UInt8Type>(kind, path, values),
        PrimitiveKind::UInt16 => integers::<UInt16Type>(kind, path, values),
        PrimitiveKind::UInt32 => integers::<UInt32Type>(kind, path, values),
        PrimitiveKind::UInt64 => integers::<UInt64Type>(kind, path, values),
        PrimitiveKind::Float32 => floats::<Float32Type>(kind, path, values, |f| {
            let narrowed = f as f32;
            (narrowed.is_finite() || !f.is_finite()).then_some(narrowed)
        }),
        PrimitiveKind::Float64 => floats::<Float64Type>(kind, path, values, Some),
        PrimitiveKind::Bool => {
            let bools = values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Ok(*b),
                    other => Err(mismatch(path, kind.name(), other)),
                })
                .collect::<Result<Vec<bool>>>()?;
            Ok(Arc::new(BooleanArray::from(bools)))
        }
        PrimitiveKind::Utf8 => {
            let strings = values
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s.as_str()),
                    other => Err(mismatch(path, kind.name(), other)),
                })
                .collect::<Result<Vec<&str>>>()?;
            check_offset_range(path, strings.iter().map(|s| s.len()).sum(), "bytes")?;
            Ok(Arc::new(StringArray::from_iter_values(strings)))
        }
        PrimitiveKind::Binary => {
            let bytes = values
                .iter()
                .map(|v| match v {
                    Value::Bytes(b) => Ok(b.as_slice()),
                    other => Err(mismatch(path, kind.name(), other)),
                })
                .collect::<Result<Vec<&[u8]>>>()?;
            check_offset_range(path, bytes.iter().map(|b| b.len()).sum(), "bytes")?;
            Ok(Arc::new(BinaryArray::from_iter_values(bytes)))
        }
    }
}

fn integers<A>(kind: PrimitiveKind, path: &FieldPath, values: &[&Value]) -> Result<ArrayRef>
where
    A: ArrowPrimitiveType,
    A::Native: TryFrom<i64> + TryFrom<u64>,
{
    let out_of_range = |shown: String| {
        TablecodeError::serialization(path, format!("value {shown} is out of range for {kind}"))
    };
    let natives = values
        .iter()
        .map(|v| match v {
            Value::Int(i) => <A::Native as TryFrom<i64>>::try_from(*i).map_err(|_| out_of_range(i.to_string())),
            Value::UInt(u) => <A::Native as TryFrom<u64>>::try_from(*u).map_err(|_| out_of_range(u.to_string())),
            other => Err(mismatch(path, kind.name(), other)),
        })
        .collect::<Result<Vec<A::Native>>>()?;
    Ok(Arc::new(PrimitiveArray::<A>::from_iter_values(natives)))
}

fn floats<A>(
    kind: PrimitiveKind,
    path: &FieldPath,
    values: &[&Value],
    narrow: impl Fn(f64) -> Option<A::Native>,
) -> Result<ArrayRef>
where
    A: ArrowPrimitiveType,
{
    let natives = values
        .iter()
        .map(|v| {
            let wide = match v {
                Value::Float(f) => *f,
                Value::Int(i) => *i as f64,
                Value::UInt(u) => *u as f64,
                other => return Err(mismatch(path, kind.name(), other)),
            };
            narrow(wide).ok_or_else(|| {
                TablecodeError::serialization(path, format!("value {wide} is out of range for {kind}"))
            })
        })
        .collect::<Result<Vec<A::Native>>>()?;
    Ok(Arc::new(PrimitiveArray::<A>::from_iter_values(natives)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_range_limit() {
        let path = FieldPath::root("Blob").child("payload");
        let limit = i32::MAX as usize;
        assert!(check_offset_range(&path, limit, "bytes").is_ok());

        match check_offset_range(&path, limit + 1, "bytes") {
            Err(TablecodeError::Serialization { path, reason, .. }) => {
                assert_eq!(path.to_string(), "Blob.payload");
                assert!(reason.contains("bytes"));
            }
            other => panic!("expected a serialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_offsets_reject_element_overflow() {
        let path = FieldPath::root("Doc").child("items");
        let lengths = vec![i32::MAX as usize, 1];
        assert!(offsets(&path, lengths).is_err());
        assert_eq!(offsets(&path, vec![2, 0, 3]).map(|o| o.len()).ok(), Some(4));
    }
}
