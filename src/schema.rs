//! Schema building and memoization.
//!
//! [`SchemaBuilder`] maps a resolved field-type tree onto Arrow types: nested records
//! become struct columns, mappings become unordered map columns with `keys`/`values`
//! entries, lists become list columns and opaque fields become binary columns. The
//! whole record is wrapped in a single non-nullable struct field named `"root"`.
//!
//! [`SchemaCache`] keeps one [`DerivedSchema`] per [`TypeKey`] for the life of the
//! engine.

use crate::codec::CodecHandle;
use crate::types::{FieldTypeNode, PrimitiveKind, ResolvedRecord, TypeKey};
use arrow::datatypes::{DataType, Field, FieldRef, Fields, Schema, SchemaRef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use twox_hash::xxhash64;

/// Name of the single top-level column of every table.
pub const ROOT_FIELD: &str = "root";
/// Name of a map column's entries struct.
pub const MAP_ENTRIES_FIELD: &str = "entries";
/// Name of a map entry's key child.
pub const MAP_KEYS_FIELD: &str = "keys";
/// Name of a map entry's value child.
pub const MAP_VALUES_FIELD: &str = "values";
/// Name of a list column's element field.
pub const LIST_ITEM_FIELD: &str = "item";

/// A node of the columnar schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Native scalar column.
    Primitive(PrimitiveKind),
    /// Struct column with one child per record field, in declaration order.
    Struct(Vec<SchemaField>),
    /// Map column with `utf8` keys and values of the inner node.
    Map(Box<SchemaNode>),
    /// List column of the inner node.
    List(Box<SchemaNode>),
    /// Binary column written and read through a codec.
    Binary(CodecHandle),
}

/// A named child of a struct node.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Column name.
    pub name: String,
    /// Column type.
    pub node: SchemaNode,
}

impl SchemaNode {
    /// The Arrow type of this node.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Primitive(kind) => kind.data_type(),
            Self::Struct(fields) => DataType::Struct(struct_fields(fields)),
            Self::Map(value) => DataType::Map(map_entries_field(value.data_type()), false),
            Self::List(element) => DataType::List(list_item_field(element.data_type())),
            Self::Binary(_) => DataType::Binary,
        }
    }

    /// Short kind label used in reports and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Primitive(kind) => kind.name(),
            Self::Struct(_) => "struct",
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Binary(_) => "binary",
        }
    }
}

pub(crate) fn struct_fields(fields: &[SchemaField]) -> Fields {
    fields
        .iter()
        .map(|f| Field::new(&f.name, f.node.data_type(), false))
        .collect()
}

/// Children of a map column's entries struct.
pub(crate) fn map_entry_fields(value: DataType) -> Fields {
    Fields::from(vec![
        Field::new(MAP_KEYS_FIELD, DataType::Utf8, false),
        Field::new(MAP_VALUES_FIELD, value, false),
    ])
}

/// The `entries` field of a map column holding values of `value`.
pub(crate) fn map_entries_field(value: DataType) -> FieldRef {
    let entries = map_entry_fields(value);
    Arc::new(Field::new(MAP_ENTRIES_FIELD, DataType::Struct(entries), false))
}

/// The `item` field of a list column holding values of `element`.
pub(crate) fn list_item_field(element: DataType) -> FieldRef {
    Arc::new(Field::new(LIST_ITEM_FIELD, element, false))
}

/// The columnar schema derived for one record type.
///
/// Immutable once built and shared through `Arc`.
#[derive(Debug, Clone)]
pub struct DerivedSchema {
    key: TypeKey,
    name: String,
    fields: Vec<SchemaField>,
    schema: SchemaRef,
}

impl DerivedSchema {
    /// Identity of the record type.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Record name, the first segment of every field path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children of the root struct, in declaration order.
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// The Arrow schema tables of this type carry.
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// The Arrow type of the `root` column.
    pub fn root_data_type(&self) -> DataType {
        DataType::Struct(struct_fields(&self.fields))
    }
}

impl PartialEq for DerivedSchema {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.fields == other.fields && self.schema == other.schema
    }
}

/// Maps resolved records to [`DerivedSchema`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Builds the schema for a resolved record. Never fails.
    pub fn build(resolved: &ResolvedRecord) -> DerivedSchema {
        let fields = Self::build_fields(resolved);
        let root = Field::new(ROOT_FIELD, DataType::Struct(struct_fields(&fields)), false);
        DerivedSchema {
            key: resolved.key.clone(),
            name: resolved.name.clone(),
            fields,
            schema: Arc::new(Schema::new(vec![root])),
        }
    }

    fn build_fields(record: &ResolvedRecord) -> Vec<SchemaField> {
        record
            .fields
            .iter()
            .map(|f| SchemaField {
                name: f.name.clone(),
                node: Self::build_node(&f.node),
            })
            .collect()
    }

    fn build_node(node: &FieldTypeNode) -> SchemaNode {
        match node {
            FieldTypeNode::Primitive(kind) => SchemaNode::Primitive(*kind),
            FieldTypeNode::Nested(record) => SchemaNode::Struct(Self::build_fields(record)),
            FieldTypeNode::Mapping { value, .. } => {
                SchemaNode::Map(Box::new(Self::build_node(value)))
            }
            FieldTypeNode::List(element) => SchemaNode::List(Box::new(Self::build_node(element))),
            FieldTypeNode::OpaqueBinary(handle) => SchemaNode::Binary(handle.clone()),
        }
    }
}

const CACHE_SEED: u64 = 0;

/// Memo table of derived schemas keyed by [`TypeKey`].
///
/// Readers take a shared lock. On a miss the schema is built outside any lock and
/// inserted first-writer-wins, so every caller ends up holding the same `Arc`.
#[derive(Debug)]
pub struct SchemaCache {
    entries: RwLock<HashMap<TypeKey, Arc<DerivedSchema>, xxhash64::State>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::with_hasher(xxhash64::State::with_seed(CACHE_SEED))),
        }
    }
}

impl SchemaCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached schema for `key`.
    pub fn get(&self, key: &TypeKey) -> Option<Arc<DerivedSchema>> {
        let hit = self.entries.read().get(key).cloned();
        if hit.is_some() {
            tracing::trace!(key = %key, "schema cache hit");
        }
        hit
    }

    /// Returns the cached schema for `key`, building it with `build` on a miss.
    ///
    /// # Errors
    /// Propagates the error of `build`; nothing is cached in that case.
    pub fn get_or_try_insert<E>(
        &self,
        key: &TypeKey,
        build: impl FnOnce() -> std::result::Result<DerivedSchema, E>,
    ) -> std::result::Result<Arc<DerivedSchema>, E> {
        if let Some(schema) = self.get(key) {
            return Ok(schema);
        }

        tracing::debug!(key = %key, "schema cache miss, deriving");
        let built = Arc::new(build()?);

        let mut entries = self.entries.write();
        let winner = entries.entry(key.clone()).or_insert(built);
        Ok(Arc::clone(winner))
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every cached schema.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolvedField;

    fn sample() -> ResolvedRecord {
        ResolvedRecord {
            key: TypeKey::new("Sample"),
            name: "Sample".into(),
            fields: vec![
                ResolvedField {
                    name: "x".into(),
                    node: FieldTypeNode::Primitive(PrimitiveKind::Int64),
                },
                ResolvedField {
                    name: "tags".into(),
                    node: FieldTypeNode::Mapping {
                        key: PrimitiveKind::Utf8,
                        value: Box::new(FieldTypeNode::Primitive(PrimitiveKind::Int64)),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_single_root_field() {
        let schema = SchemaBuilder::build(&sample()).arrow_schema();
        assert_eq!(schema.fields().len(), 1);
        let root = schema.field(0);
        assert_eq!(root.name(), ROOT_FIELD);
        assert!(!root.is_nullable());
        let DataType::Struct(children) = root.data_type() else {
            panic!("root is not a struct");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1].data_type(), DataType::Map(_, false)));
    }

    #[test]
    fn test_cache_failed_build_is_not_stored() {
        let cache = SchemaCache::new();
        let key = TypeKey::new("Sample");
        let err: std::result::Result<_, &str> = cache.get_or_try_insert(&key, || Err("nope"));
        assert!(err.is_err());
        assert!(cache.is_empty());

        let first = cache
            .get_or_try_insert::<()>(&key, || Ok(SchemaBuilder::build(&sample())))
            .unwrap();
        let second = cache
            .get_or_try_insert::<()>(&key, || panic!("rebuilt a cached schema"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
