#![allow(missing_docs)]

use arrow::array::{Array, AsArray};
use arrow::datatypes::Int64Type;
use std::collections::{BTreeMap, HashMap};
use tablecode::format::decode_npy;
use tablecode::types::{DeclaredType, PrimitiveKind, RecordType};
use tablecode::value::OpaqueValue;
use tablecode::{Blob, NdArray, RecordValue, TableRecord, Tablecode, Value};

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Inner {
    z: i64,
    a: String,
}

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Outer {
    x: i64,
    y: f64,
    q: Inner,
    nd: HashMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Frame {
    item: NdArray,
}

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Telemetry {
    id: u16,
    level: i8,
    ratio: f32,
    ok: bool,
    payload: Blob,
    tags: Vec<String>,
    history: Vec<Vec<i32>>,
    labels: BTreeMap<String, u64>,
    children: Vec<Inner>,
}

fn outer(i: i64) -> Outer {
    Outer {
        x: i,
        y: i as f64 * 0.5,
        q: Inner {
            z: -i,
            a: format!("inner-{i}"),
        },
        nd: (0..i).map(|k| (format!("k{k}"), k * 10)).collect(),
    }
}

fn telemetry(i: u16) -> Telemetry {
    Telemetry {
        id: i,
        level: -(i as i8),
        ratio: 0.25 * f32::from(i),
        ok: i % 2 == 0,
        payload: Blob(vec![i as u8; usize::from(i)]),
        tags: (0..i).map(|t| format!("t{t}")).collect(),
        history: vec![vec![], vec![i32::from(i), -1]],
        labels: BTreeMap::from([("count".to_string(), u64::from(i))]),
        children: vec![Inner {
            z: i64::from(i),
            a: String::new(),
        }],
    }
}

// --- TESTS ---

/// `{item: int}` instances 0..5 -> root's only child holds 0,1,2,3,4.
#[test]
fn test_primitive_column_contents() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Item")
        .field("item", DeclaredType::INT)
        .build();
    let schema = engine.register_record_type(&record)?;

    let rows: Vec<RecordValue> = (0..5i64)
        .map(|i| RecordValue::new().with("item", i))
        .collect();
    let table = engine.serialize_values(&schema, &rows)?;

    assert_eq!(table.num_rows(), 5);
    let root = table.column(0).as_struct();
    assert_eq!(root.num_columns(), 1);
    let items = root.column(0).as_primitive::<Int64Type>();
    assert_eq!(items.values().to_vec(), vec![0, 1, 2, 3, 4]);

    assert_eq!(engine.deserialize_values(&table, &schema)?, rows);
    Ok(())
}

/// Array-valued field: binary column whose cells decode to the original arrays.
#[test]
fn test_opaque_column_contents() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let frames: Vec<Frame> = (0..5)
        .map(|i| Frame {
            item: NdArray::full(vec![i + 1], i as i64).expect("small shape"),
        })
        .collect();

    let table = engine.serialize(&frames)?;
    let cells = table.column(0).as_struct().column(0).as_binary::<i32>();
    assert_eq!(cells.len(), 5);
    for (i, frame) in frames.iter().enumerate() {
        let decoded = decode_npy(cells.value(i)).expect("cell holds a valid npy blob");
        assert_eq!(decoded, frame.item);
        assert_eq!(decoded.shape(), &[i + 1]);
    }

    assert_eq!(engine.deserialize::<Frame>(&table)?, frames);
    Ok(())
}

#[test]
fn test_nested_record_with_mapping() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let rows: Vec<Outer> = (0..10).map(outer).collect();

    let table = engine.serialize(&rows)?;
    assert_eq!(table.num_rows(), 10);

    let q = table.column(0).as_struct().column_by_name("q").expect("q column");
    let z = q.as_struct().column(0).as_primitive::<Int64Type>();
    assert_eq!(z.value(7), -7);

    let nd = table.column(0).as_struct().column(3).as_map();
    assert_eq!(nd.value_length(4), 4);

    assert_eq!(engine.deserialize::<Outer>(&table)?, rows);
    Ok(())
}

#[test]
fn test_map_preserves_entry_order() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Ordered")
        .field("m", DeclaredType::map(DeclaredType::STRING))
        .build();
    let schema = engine.register_record_type(&record)?;

    let entries = vec![
        ("zeta".to_string(), Value::from("last letter")),
        ("alpha".to_string(), Value::from("first letter")),
    ];
    let rows = vec![RecordValue::new().with("m", Value::Map(entries))];
    let table = engine.serialize_values(&schema, &rows)?;

    assert_eq!(engine.deserialize_values(&table, &schema)?, rows);
    Ok(())
}

#[test]
fn test_empty_batch() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register::<Outer>()?;

    let table = engine.serialize::<Outer>(&[])?;
    assert_eq!(table.num_rows(), 0);
    assert_eq!(table.schema(), schema.arrow_schema());
    assert_eq!(engine.empty_table(&schema).schema(), schema.arrow_schema());

    assert!(engine.deserialize::<Outer>(&table)?.is_empty());
    Ok(())
}

/// Narrow widths, blobs, nested lists, sorted maps and lists of records.
#[test]
fn test_mixed_container_roundtrip() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let rows: Vec<Telemetry> = (0..20).map(telemetry).collect();

    let table = engine.serialize(&rows)?;
    let root = table.column(0).as_struct();
    assert_eq!(root.column(0).data_type(), &arrow::datatypes::DataType::UInt16);
    assert_eq!(root.column(4).data_type(), &arrow::datatypes::DataType::Binary);

    assert_eq!(engine.deserialize::<Telemetry>(&table)?, rows);
    Ok(())
}

/// Runtime records with a manually built opaque field.
#[test]
fn test_record_values_with_opaque_field() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Reading")
        .field("sensor", DeclaredType::STRING)
        .field("gain", DeclaredType::Primitive(PrimitiveKind::Float32))
        .field("samples", DeclaredType::opaque("NdArray"))
        .build();
    let schema = engine.register_record_type(&record)?;

    let samples = NdArray::from_shape_vec(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .expect("shape matches data");
    let rows = vec![
        RecordValue::new()
            .with("sensor", "north")
            .with("gain", 1.5)
            .with("samples", Value::Opaque(OpaqueValue::new(samples.clone()))),
    ];

    let table = engine.serialize_values(&schema, &rows)?;
    let back = engine.deserialize_values(&table, &schema)?;
    assert_eq!(back, rows);

    let Some(Value::Opaque(decoded)) = back[0].get("samples") else {
        panic!("samples is not opaque");
    };
    assert_eq!(decoded.downcast_ref::<NdArray>(), Some(&samples));
    Ok(())
}

/// Fields given out of order are written in declaration order.
#[test]
fn test_field_order_follows_declaration() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Pair")
        .field("first", DeclaredType::INT)
        .field("second", DeclaredType::STRING)
        .build();
    let schema = engine.register_record_type(&record)?;

    let rows = vec![RecordValue::new().with("second", "b").with("first", 1i64)];
    let table = engine.serialize_values(&schema, &rows)?;
    let back = engine.deserialize_values(&table, &schema)?;

    assert_eq!(back[0], RecordValue::new().with("first", 1i64).with("second", "b"));
    Ok(())
}

/// Numbers given in another variant than the column's come back equal by value.
#[test]
fn test_cross_variant_numbers_roundtrip() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Mixed")
        .field("i", DeclaredType::INT)
        .field("f", DeclaredType::FLOAT)
        .field("n", DeclaredType::Primitive(PrimitiveKind::Int32))
        .field("u", DeclaredType::Primitive(PrimitiveKind::UInt16))
        .field("xs", DeclaredType::list(DeclaredType::FLOAT))
        .build();
    let schema = engine.register_record_type(&record)?;

    let rows = vec![
        RecordValue::new()
            .with("i", 5u64)
            .with("f", 2i64)
            .with("n", 3i64)
            .with("u", 9i64)
            .with("xs", Value::List(vec![Value::Int(-1), Value::UInt(4), Value::Float(0.5)])),
    ];
    let table = engine.serialize_values(&schema, &rows)?;
    let back = engine.deserialize_values(&table, &schema)?;

    assert_eq!(back[0].get("i"), Some(&Value::Int(5)));
    assert_eq!(back[0].get("f"), Some(&Value::Float(2.0)));
    assert_eq!(back[0].get("u"), Some(&Value::UInt(9)));
    assert_eq!(back, rows);
    Ok(())
}

#[test]
fn test_numeric_value_equality() {
    assert_eq!(Value::Int(5), Value::UInt(5));
    assert_eq!(Value::UInt(2), Value::Float(2.0));
    assert_ne!(Value::Int(-1), Value::UInt(u64::MAX));
    assert_ne!(Value::Int(1), Value::Float(1.5));
    assert_ne!(Value::Int(1), Value::Bool(true));
    assert_eq!(
        Value::Map(vec![("k".to_string(), Value::Int(1))]),
        Value::Map(vec![("k".to_string(), Value::Float(1.0))])
    );
}

#[test]
fn test_concat_tables() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register::<Outer>()?;

    let first = engine.serialize(&(0..3).map(outer).collect::<Vec<_>>())?;
    let second = engine.serialize(&(3..8).map(outer).collect::<Vec<_>>())?;
    let merged = engine.concat_tables(&schema, &[first, second])?;

    assert_eq!(merged.num_rows(), 8);
    assert_eq!(
        engine.deserialize::<Outer>(&merged)?,
        (0..8).map(outer).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn test_concat_rejects_foreign_table() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register::<Outer>()?;

    let outer_table = engine.serialize(&[outer(1)])?;
    let inner_table = engine.serialize(&[Inner {
        z: 1,
        a: "x".into(),
    }])?;

    let result = engine.concat_tables(&schema, &[outer_table, inner_table]);
    assert!(matches!(result, Err(tablecode::TablecodeError::Serialization { .. })));
    Ok(())
}

/// Parallel and sequential codec paths produce identical tables.
#[test]
fn test_parallel_codec_path_matches_sequential() -> tablecode::Result<()> {
    let parallel = Tablecode::builder().parallel_threshold(1).build();
    let sequential = Tablecode::builder().parallel_threshold(usize::MAX).build();
    let frames: Vec<Frame> = (0..64)
        .map(|i| Frame {
            item: NdArray::full(vec![2, i + 1], i as f64).expect("small shape"),
        })
        .collect();

    let a = parallel.serialize(&frames)?;
    let b = sequential.serialize(&frames)?;
    assert_eq!(a, b);

    assert_eq!(parallel.deserialize::<Frame>(&b)?, frames);
    assert_eq!(sequential.deserialize::<Frame>(&a)?, frames);
    Ok(())
}

#[test]
fn test_global_engine() -> tablecode::Result<()> {
    assert!(std::ptr::eq(Tablecode::global(), Tablecode::global()));

    let rows: Vec<Outer> = (0..3).map(outer).collect();
    let table = Tablecode::global().serialize(&rows)?;
    assert_eq!(Tablecode::global().deserialize::<Outer>(&table)?, rows);
    Ok(())
}
