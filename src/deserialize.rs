//! The read side: columnar tables back to record values.
//!
//! Before any value is touched the table's schema is compared against the derived
//! schema, so a table written for a different (or older) record type fails with the
//! path of the first column that does not line up. Decoding then mirrors the
//! serializer: one column at a time, children first, with struct rows rebuilt by
//! transposing their child columns.

use crate::Table;
use crate::codec::CodecHandle;
use crate::error::{Result, TablecodeError};
use crate::schema::{DerivedSchema, ROOT_FIELD, SchemaField, SchemaNode};
use crate::serialize::SerializeOptions;
use crate::types::{FieldPath, PrimitiveKind};
use crate::value::{RecordValue, Value};
use arrow::array::{
    Array, BinaryArray, BooleanArray, ListArray, MapArray, PrimitiveArray, StringArray,
    StructArray,
};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
    Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use rayon::prelude::*;

/// Reads every row of `table` back into record values of `schema`.
///
/// # Errors
/// Returns [`TablecodeError::Deserialization`] if the table's schema does not match
/// (naming the first mismatching field), if any value is null, or if a codec fails to
/// decode a cell.
pub fn deserialize(
    table: &Table,
    schema: &DerivedSchema,
    options: &SerializeOptions,
) -> Result<Vec<RecordValue>> {
    let path = FieldPath::root(schema.name());
    check_table_schema(table, schema, &path)?;

    let root = downcast::<StructArray>(table.column(0).as_ref(), &path)?;
    let decoder = ColumnDecoder { options };
    let rows = decoder.decode_struct(schema.fields(), &path, root)?;

    tracing::debug!(record = schema.name(), rows = rows.len(), "deserialized batch");
    Ok(rows)
}

// --- Schema check ---

fn check_table_schema(table: &Table, schema: &DerivedSchema, path: &FieldPath) -> Result<()> {
    let table_schema = table.schema();
    let fields = table_schema.fields();
    let [root] = &fields[..] else {
        return Err(TablecodeError::deserialization(
            path,
            format!("expected a single '{ROOT_FIELD}' column, found {}", fields.len()),
        ));
    };
    if root.name() != ROOT_FIELD {
        return Err(TablecodeError::deserialization(
            path,
            format!("expected a '{ROOT_FIELD}' column, found '{}'", root.name()),
        ));
    }
    check_struct(schema.fields(), root.data_type(), path)
}

fn check_struct(expected: &[SchemaField], actual: &DataType, path: &FieldPath) -> Result<()> {
    let DataType::Struct(columns) = actual else {
        return Err(type_mismatch(path, "struct", actual));
    };

    for (index, field) in expected.iter().enumerate() {
        let field_path = path.child(&field.name);
        match columns.get(index) {
            Some(column) if column.name() == &field.name => {
                check_node(&field.node, column.data_type(), &field_path)?;
            }
            _ => {
                let reason = if columns.iter().any(|c| c.name() == &field.name) {
                    format!("column is out of declaration order (expected at position {index})")
                } else {
                    "table has no column for this field".to_string()
                };
                return Err(TablecodeError::deserialization(&field_path, reason));
            }
        }
    }
    if let Some(extra) = columns.get(expected.len()) {
        return Err(TablecodeError::deserialization(
            &path.child(extra.name()),
            "table has a column the record type does not declare",
        ));
    }
    Ok(())
}

fn check_node(node: &SchemaNode, actual: &DataType, path: &FieldPath) -> Result<()> {
    match (node, actual) {
        (SchemaNode::Primitive(kind), _) if kind.data_type() == *actual => Ok(()),
        (SchemaNode::Struct(fields), _) => check_struct(fields, actual, path),
        (SchemaNode::Map(value), DataType::Map(entries, _)) => match entries.data_type() {
            DataType::Struct(kv) if kv.len() == 2 => {
                if kv[0].data_type() != &DataType::Utf8 {
                    return Err(type_mismatch(&path.element("key"), "utf8", kv[0].data_type()));
                }
                check_node(value, kv[1].data_type(), &path.element("value"))
            }
            other => Err(type_mismatch(path, "map entries struct", other)),
        },
        (SchemaNode::List(element), DataType::List(item)) => {
            check_node(element, item.data_type(), &path.element("item"))
        }
        (SchemaNode::Binary(_), DataType::Binary) => Ok(()),
        (node, actual) => Err(type_mismatch(path, &node.data_type().to_string(), actual)),
    }
}

fn type_mismatch(path: &FieldPath, expected: &str, actual: &DataType) -> TablecodeError {
    TablecodeError::deserialization(path, format!("expected {expected} column, found {actual}"))
}

// --- Column decoding ---

struct ColumnDecoder<'o> {
    options: &'o SerializeOptions,
}

impl ColumnDecoder<'_> {
    fn decode_struct(
        &self,
        fields: &[SchemaField],
        path: &FieldPath,
        array: &StructArray,
    ) -> Result<Vec<RecordValue>> {
        reject_nulls(array, path)?;
        let mut rows: Vec<RecordValue> = (0..array.len())
            .map(|_| RecordValue::with_capacity(fields.len()))
            .collect();

        for (index, field) in fields.iter().enumerate() {
            let field_path = path.child(&field.name);
            let column = self.decode_column(&field.node, &field_path, array.column(index).as_ref())?;
            for (row, value) in rows.iter_mut().zip(column) {
                row.push(field.name.clone(), value);
            }
        }
        Ok(rows)
    }

    fn decode_column(
        &self,
        node: &SchemaNode,
        path: &FieldPath,
        array: &dyn Array,
    ) -> Result<Vec<Value>> {
        reject_nulls(array, path)?;
        match node {
            SchemaNode::Primitive(kind) => decode_primitive(*kind, path, array),
            SchemaNode::Struct(fields) => {
                let structs = downcast::<StructArray>(array, path)?;
                let rows = self.decode_struct(fields, path, structs)?;
                Ok(rows.into_iter().map(Value::Record).collect())
            }
            SchemaNode::Map(value_node) => {
                let map = downcast::<MapArray>(array, path)?;
                let keys = downcast::<StringArray>(map.keys().as_ref(), &path.element("key"))?;
                let values =
                    self.decode_column(value_node, &path.element("value"), map.values().as_ref())?;
                let offsets = map.value_offsets();

                let mut items = values.into_iter().skip(first_offset(offsets));
                let mut out = Vec::with_capacity(map.len());
                for window in offsets.windows(2) {
                    let (start, end) = (to_index(window[0]), to_index(window[1]));
                    let entries = (start..end)
                        .map(|i| keys.value(i).to_string())
                        .zip(items.by_ref().take(end - start))
                        .collect();
                    out.push(Value::Map(entries));
                }
                Ok(out)
            }
            SchemaNode::List(element) => {
                let list = downcast::<ListArray>(array, path)?;
                let values =
                    self.decode_column(element, &path.element("item"), list.values().as_ref())?;
                let offsets = list.value_offsets();

                let mut items = values.into_iter().skip(first_offset(offsets));
                let out = offsets
                    .windows(2)
                    .map(|w| {
                        let len = to_index(w[1]) - to_index(w[0]);
                        Value::List(items.by_ref().take(len).collect())
                    })
                    .collect();
                Ok(out)
            }
            SchemaNode::Binary(handle) => self.decode_opaque(handle, path, array),
        }
    }

    fn decode_opaque(
        &self,
        handle: &CodecHandle,
        path: &FieldPath,
        array: &dyn Array,
    ) -> Result<Vec<Value>> {
        let blobs = downcast::<BinaryArray>(array, path)?;
        let cells: Vec<&[u8]> = (0..blobs.len()).map(|i| blobs.value(i)).collect();

        let decoded = if cells.len() >= self.options.parallel_threshold {
            cells
                .par_iter()
                .map(|bytes| handle.decode(bytes))
                .collect::<std::result::Result<Vec<_>, _>>()
        } else {
            cells.iter().map(|bytes| handle.decode(bytes)).collect()
        };
        let values = decoded.map_err(|e| TablecodeError::Deserialization {
            path: path.clone(),
            reason: format!("codec '{}' failed to decode", handle.name()),
            source: Some(e),
        })?;
        Ok(values.into_iter().map(Value::Opaque).collect())
    }
}

fn first_offset(offsets: &[i32]) -> usize {
    offsets.first().copied().map_or(0, to_index)
}

// Offsets of a valid array are non-negative.
fn to_index(offset: i32) -> usize {
    usize::try_from(offset).unwrap_or(0)
}

fn reject_nulls(array: &dyn Array, path: &FieldPath) -> Result<()> {
    if array.null_count() > 0 {
        return Err(TablecodeError::deserialization(
            path,
            format!("column holds {} null values", array.null_count()),
        ));
    }
    Ok(())
}

fn downcast<'a, T: Array + 'static>(array: &'a dyn Array, path: &FieldPath) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        TablecodeError::deserialization(
            path,
            format!("unexpected column type {}", array.data_type()),
        )
    })
}

fn decode_primitive(kind: PrimitiveKind, path: &FieldPath, array: &dyn Array) -> Result<Vec<Value>> {
    match kind {
        PrimitiveKind::Int8 => natives::<Int8Type>(array, path, |v| Value::Int(i64::from(v))),
        PrimitiveKind::Int16 => natives::<Int16Type>(array, path, |v| Value::Int(i64::from(v))),
        PrimitiveKind::Int32 => natives::<Int32Type>(array, path, |v| Value::Int(i64::from(v))),
        PrimitiveKind::Int64 => natives::<Int64Type>(array, path, Value::Int),
        PrimitiveKind::UInt8 => natives::<UInt8Type>(array, path, |v| Value::UInt(u64::from(v))),
        PrimitiveKind::UInt16 => natives::<UInt16Type>(array, path, |v| Value::UInt(u64::from(v))),
        PrimitiveKind::UInt32 => natives::<UInt32Type>(array, path, |v| Value::UInt(u64::from(v))),
        PrimitiveKind::UInt64 => natives::<UInt64Type>(array, path, Value::UInt),
        PrimitiveKind::Float32 => {
            natives::<Float32Type>(array, path, |v| Value::Float(f64::from(v)))
        }
        PrimitiveKind::Float64 => natives::<Float64Type>(array, path, Value::Float),
        PrimitiveKind::Bool => {
            let bools = downcast::<BooleanArray>(array, path)?;
            Ok(bools.values().iter().map(Value::Bool).collect())
        }
        PrimitiveKind::Utf8 => {
            let strings = downcast::<StringArray>(array, path)?;
            Ok((0..strings.len())
                .map(|i| Value::Str(strings.value(i).to_string()))
                .collect())
        }
        PrimitiveKind::Binary => {
            let bytes = downcast::<BinaryArray>(array, path)?;
            Ok((0..bytes.len())
                .map(|i| Value::Bytes(bytes.value(i).to_vec()))
                .collect())
        }
    }
}

fn natives<A: ArrowPrimitiveType>(
    array: &dyn Array,
    path: &FieldPath,
    wrap: impl Fn(A::Native) -> Value,
) -> Result<Vec<Value>> {
    let typed = downcast::<PrimitiveArray<A>>(array, path)?;
    Ok(typed.values().iter().map(|v| wrap(*v)).collect())
}
