#![allow(missing_docs)]

use tablecode::types::{DeclaredType, PrimitiveKind, RecordType};
use tablecode::{RecordValue, TableRecord, Tablecode, TablecodeError, Value};

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Node {
    value: i64,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, TableRecord)]
struct Tiny {
    small: i8,
}

#[derive(Debug, Clone, PartialEq, TableRecord)]
#[tablecode(name = "Tiny")]
struct Wide {
    small: i64,
}

fn outer_record(inner: RecordType) -> RecordType {
    RecordType::builder("Outer")
        .field("x", DeclaredType::INT)
        .field("q", DeclaredType::record(inner))
        .build()
}

fn inner_full() -> RecordType {
    RecordType::builder("Inner")
        .field("z", DeclaredType::INT)
        .field("a", DeclaredType::STRING)
        .build()
}

fn resolution_path(result: tablecode::Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(TablecodeError::SchemaResolution { path, .. }) => path.to_string(),
        other => panic!("expected a schema resolution error, got {other:?}"),
    }
}

fn serialization_path(result: tablecode::Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(TablecodeError::Serialization { path, .. }) => path.to_string(),
        other => panic!("expected a serialization error, got {other:?}"),
    }
}

fn deserialization_path(result: tablecode::Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(TablecodeError::Deserialization { path, .. }) => path.to_string(),
        other => panic!("expected a deserialization error, got {other:?}"),
    }
}

// --- TESTS: SCHEMA RESOLUTION ---

#[test]
fn test_missing_codec_names_field() {
    let engine = Tablecode::new();
    let record = outer_record(
        RecordType::builder("Inner")
            .field("blob", DeclaredType::opaque("Unregistered"))
            .build(),
    );
    assert_eq!(resolution_path(engine.register_record_type(&record)), "Outer.q.blob");
}

/// A record reaching itself through a list is rejected instead of recursing forever.
#[test]
fn test_cyclic_record_is_rejected() {
    let engine = Tablecode::new();
    assert_eq!(resolution_path(engine.register::<Node>()), "Node.children[item]");
}

#[test]
fn test_non_string_map_key() {
    let engine = Tablecode::new();
    let record = RecordType::builder("Lookup")
        .field(
            "by_id",
            DeclaredType::Map {
                key: PrimitiveKind::Int64,
                value: Box::new(DeclaredType::STRING),
            },
        )
        .build();
    assert_eq!(resolution_path(engine.register_record_type(&record)), "Lookup.by_id");
}

#[test]
fn test_empty_record_is_rejected() {
    let engine = Tablecode::new();
    let record = outer_record(RecordType::builder("Inner").build());
    assert_eq!(resolution_path(engine.register_record_type(&record)), "Outer.q");
}

#[test]
fn test_duplicate_field_name() {
    let engine = Tablecode::new();
    let record = RecordType::builder("Twice")
        .field("a", DeclaredType::INT)
        .field("a", DeclaredType::STRING)
        .build();
    assert_eq!(resolution_path(engine.register_record_type(&record)), "Twice.a");
}

/// A failed derivation is not cached; fixing the registry makes the next call succeed.
#[test]
fn test_failed_resolution_is_retried() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Later")
        .field("c", DeclaredType::opaque("Celsius"))
        .build();
    assert!(engine.register_record_type(&record).is_err());

    engine.register_codec_fn(
        tablecode::CodecKey::exact("Celsius"),
        |c: &u64| Ok(c.to_le_bytes().to_vec()),
        |_bytes: &[u8]| Ok(0u64),
    )?;
    assert!(engine.register_record_type(&record).is_ok());
    Ok(())
}

// --- TESTS: SERIALIZATION ---

#[test]
fn test_integer_out_of_range_for_declared_width() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Narrow")
        .field("small", DeclaredType::Primitive(PrimitiveKind::Int8))
        .field("unsigned", DeclaredType::Primitive(PrimitiveKind::UInt32))
        .build();
    let schema = engine.register_record_type(&record)?;

    let too_big = vec![RecordValue::new().with("small", 300i64).with("unsigned", 1u64)];
    assert_eq!(serialization_path(engine.serialize_values(&schema, &too_big)), "Narrow.small");

    let negative = vec![RecordValue::new().with("small", 1i64).with("unsigned", -1i64)];
    assert_eq!(
        serialization_path(engine.serialize_values(&schema, &negative)),
        "Narrow.unsigned"
    );

    let fits = vec![RecordValue::new().with("small", -128i64).with("unsigned", 7u64)];
    assert_eq!(engine.serialize_values(&schema, &fits)?.num_rows(), 1);
    Ok(())
}

#[test]
fn test_float_overflow_for_float32() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Gain")
        .field("g", DeclaredType::Primitive(PrimitiveKind::Float32))
        .build();
    let schema = engine.register_record_type(&record)?;

    let rows = vec![RecordValue::new().with("g", 1e300)];
    assert_eq!(serialization_path(engine.serialize_values(&schema, &rows)), "Gain.g");
    Ok(())
}

#[test]
fn test_wrong_value_kind() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register_record_type(&outer_record(inner_full()))?;

    let rows = vec![
        RecordValue::new()
            .with("x", 1i64)
            .with("q", RecordValue::new().with("z", "not a number").with("a", "a")),
    ];
    assert_eq!(serialization_path(engine.serialize_values(&schema, &rows)), "Outer.q.z");
    Ok(())
}

#[test]
fn test_missing_and_undeclared_values() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register_record_type(&outer_record(inner_full()))?;

    let missing = vec![
        RecordValue::new()
            .with("x", 1i64)
            .with("q", RecordValue::new().with("z", 2i64)),
    ];
    assert_eq!(serialization_path(engine.serialize_values(&schema, &missing)), "Outer.q.a");

    let undeclared = vec![
        RecordValue::new()
            .with("x", 1i64)
            .with("q", RecordValue::new().with("z", 2i64).with("a", "a"))
            .with("extra", true),
    ];
    assert_eq!(
        serialization_path(engine.serialize_values(&schema, &undeclared)),
        "Outer.extra"
    );
    Ok(())
}

/// One bad row fails the whole batch.
#[test]
fn test_batch_is_all_or_nothing() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Item")
        .field("item", DeclaredType::INT)
        .build();
    let schema = engine.register_record_type(&record)?;

    let mut rows: Vec<RecordValue> = (0..99i64).map(|i| RecordValue::new().with("item", i)).collect();
    rows.push(RecordValue::new().with("item", Value::Bool(true)));
    assert_eq!(serialization_path(engine.serialize_values(&schema, &rows)), "Item.item");
    Ok(())
}

// --- TESTS: DESERIALIZATION ---

/// Deserializing against a record type that declares a column the table lacks.
#[test]
fn test_missing_column_names_nested_path() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let old = RecordType::builder_with_key("OuterV1", "Outer")
        .field("x", DeclaredType::INT)
        .field(
            "q",
            DeclaredType::record(RecordType::builder("Inner").field("a", DeclaredType::STRING).build()),
        )
        .build();
    let old_schema = engine.register_record_type(&old)?;
    let rows = vec![
        RecordValue::new()
            .with("x", 1i64)
            .with("q", RecordValue::new().with("a", "a")),
    ];
    let table = engine.serialize_values(&old_schema, &rows)?;

    let new_schema = engine.register_record_type(&outer_record(inner_full()))?;
    assert_eq!(
        deserialization_path(engine.deserialize_values(&table, &new_schema)),
        "Outer.q.z"
    );
    Ok(())
}

#[test]
fn test_column_type_mismatch() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let table = engine.serialize(&[Wide { small: 5 }])?;
    assert_eq!(deserialization_path(engine.deserialize::<Tiny>(&table)), "Tiny.small");
    Ok(())
}

#[test]
fn test_undeclared_column_in_table() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let table = engine.serialize_values(
        &*engine.register_record_type(&outer_record(inner_full()))?,
        &[RecordValue::new()
            .with("x", 1i64)
            .with("q", RecordValue::new().with("z", 2i64).with("a", "a"))],
    )?;

    let narrower = RecordType::builder_with_key("OuterX", "Outer")
        .field("x", DeclaredType::INT)
        .build();
    let schema = engine.register_record_type(&narrower)?;
    assert_eq!(deserialization_path(engine.deserialize_values(&table, &schema)), "Outer.q");
    Ok(())
}

#[test]
fn test_error_display_contains_path() {
    let engine = Tablecode::new();
    let err = engine
        .register::<Node>()
        .expect_err("cyclic records cannot be registered");
    assert_eq!(err.path().map(ToString::to_string).as_deref(), Some("Node.children[item]"));
    assert!(err.to_string().contains("Node.children[item]"));
}
