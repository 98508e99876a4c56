#![allow(missing_docs)]

use arrow::datatypes::DataType;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tablecode::schema::SchemaNode;
use tablecode::types::{DeclaredType, PrimitiveKind, RecordType, TypeKey};
use tablecode::{DerivedSchema, NdArray, SchemaInspector, TableRecord, Tablecode};

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

fn sensor_record() -> RecordType {
    RecordType::builder("Sensor")
        .field("id", DeclaredType::INT)
        .field("name", DeclaredType::STRING)
        .field("active", DeclaredType::BOOL)
        .field("samples", DeclaredType::opaque("NdArray"))
        .field("gain", DeclaredType::Primitive(PrimitiveKind::Float32))
        .build()
}

fn root_children(schema: &DerivedSchema) -> Vec<(String, DataType)> {
    let arrow_schema = schema.arrow_schema();
    match arrow_schema.field(0).data_type() {
        DataType::Struct(fields) => fields
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect(),
        other => panic!("root is not a struct: {other}"),
    }
}

// --- TESTS ---

/// k declared fields -> exactly one `root` struct field with k children in order.
#[test]
fn test_single_root_struct_in_declaration_order() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register_record_type(&sensor_record())?;

    let arrow_schema = schema.arrow_schema();
    assert_eq!(arrow_schema.fields().len(), 1);
    assert_eq!(arrow_schema.field(0).name(), "root");
    assert!(!arrow_schema.field(0).is_nullable());

    let names: Vec<String> = root_children(&schema).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, ["id", "name", "active", "samples", "gain"]);
    Ok(())
}

#[test]
fn test_kind_mapping() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register_record_type(&sensor_record())?;
    let kinds: Vec<DataType> = root_children(&schema).into_iter().map(|(_, t)| t).collect();

    assert_eq!(
        kinds,
        [
            DataType::Int64,
            DataType::Utf8,
            DataType::Boolean,
            DataType::Binary,
            DataType::Float32,
        ]
    );
    assert!(matches!(schema.fields()[3].node, SchemaNode::Binary(_)));
    Ok(())
}

#[test]
fn test_nested_and_map_shape() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let schema = engine.register::<Outer>()?;
    let children = root_children(&schema);

    let DataType::Struct(q) = &children[2].1 else {
        panic!("q is not a struct");
    };
    let q_names: Vec<&str> = q.iter().map(|f| f.name().as_str()).collect();
    assert_eq!(q_names, ["z", "a"]);

    let DataType::Map(entries, ordered) = &children[3].1 else {
        panic!("nd is not a map");
    };
    assert!(!ordered);
    let DataType::Struct(kv) = entries.data_type() else {
        panic!("map entries are not a struct");
    };
    assert_eq!(kv[0].name(), "keys");
    assert_eq!(kv[0].data_type(), &DataType::Utf8);
    assert_eq!(kv[1].name(), "values");
    assert_eq!(kv[1].data_type(), &DataType::Int64);
    Ok(())
}

#[test]
fn test_list_shape() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = RecordType::builder("Track")
        .field("points", DeclaredType::list(DeclaredType::FLOAT))
        .build();
    let schema = engine.register_record_type(&record)?;

    let DataType::List(item) = &root_children(&schema)[0].1 else {
        panic!("points is not a list");
    };
    assert_eq!(item.name(), "item");
    assert_eq!(item.data_type(), &DataType::Float64);
    Ok(())
}

/// Second derivation: same `Arc`, no new codec lookups.
#[test]
fn test_memoization() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = sensor_record();

    let first = engine.register_record_type(&record)?;
    let lookups = engine.codec_lookup_count();
    assert!(lookups > 0);

    let second = engine.register_record_type(&record)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.codec_lookup_count(), lookups);

    let cached = engine
        .schema_for(&TypeKey::new("Sensor"))
        .expect("schema was registered");
    assert!(Arc::ptr_eq(&first, &cached));
    Ok(())
}

/// Two engines deriving the same type agree structurally.
#[test]
fn test_derivation_is_deterministic() -> tablecode::Result<()> {
    let a = Tablecode::new().register::<Outer>()?;
    let b = Tablecode::new().register::<Outer>()?;
    assert_eq!(*a, *b);
    assert_eq!(SchemaInspector::fingerprint(&a), SchemaInspector::fingerprint(&b));
    Ok(())
}

#[test]
fn test_concurrent_first_registration_shares_one_schema() -> tablecode::Result<()> {
    let engine = Tablecode::new();
    let record = sensor_record();

    let schemas = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| engine.register_record_type(&record)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("registration thread panicked"))
            .collect::<tablecode::Result<Vec<_>>>()
    })?;

    let first = &schemas[0];
    assert!(schemas.iter().all(|s| Arc::ptr_eq(first, s)));
    Ok(())
}

#[test]
fn test_unknown_key_has_no_schema() {
    let engine = Tablecode::new();
    assert!(engine.schema_for(&TypeKey::new("Nope")).is_none());
}

#[test]
fn test_inspector_report() -> tablecode::Result<()> {
    #[derive(Debug, Clone, PartialEq, TableRecord)]
    struct Scan {
        id: u32,
        frames: Vec<NdArray>,
        meta: HashMap<String, String>,
    }

    let engine = Tablecode::new();
    let schema = engine.register::<Scan>()?;
    let report = SchemaInspector::inspect(&schema);

    assert_eq!(report.record, "Scan");
    assert_eq!(report.fingerprint.len(), 16);
    // root, id, frames, [item], meta, [value]
    assert_eq!(report.column_count, 6);

    let frames = &report.tree.children[1];
    assert_eq!(frames.kind, "list");
    assert_eq!(frames.children[0].codec.as_deref(), Some("npy"));

    let rendered = report.to_string();
    assert!(rendered.contains("└── root: struct"));
    assert!(rendered.contains("[item]: binary [codec: npy]"));

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["tree"]["children"][0]["kind"], "uint32");
    Ok(())
}
