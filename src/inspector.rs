// src/inspector.rs

//! Tools for inspecting derived schemas.
//! useful for debugging nested layouts and verifying that two processes agree on a schema.

use crate::schema::{DerivedSchema, ROOT_FIELD, SchemaField, SchemaNode};
use serde::Serialize;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// A structural report of a derived schema.
#[derive(Debug, Serialize)]
pub struct SchemaReport {
    /// Record name.
    pub record: String,
    /// Identity key of the record type.
    pub type_key: String,
    /// xxHash64 of the Arrow schema, as 16 hex digits.
    pub fingerprint: String,
    /// Total number of columns at every nesting level, containers included.
    pub column_count: usize,
    /// The hierarchical tree of columns, starting at `root`.
    pub tree: FieldInfo,
}

/// Metadata for a single column.
#[derive(Debug, Serialize)]
pub struct FieldInfo {
    /// Column name; container elements are `[value]` and `[item]`.
    pub name: String,
    /// Kind label (`int64`, `struct`, `map`, ...).
    pub kind: String,
    /// Arrow type rendered as text.
    pub data_type: String,
    /// Codec name, for opaque binary columns.
    pub codec: Option<String>,
    /// Child columns.
    pub children: Vec<FieldInfo>,
}

/// The schema inspector tool.
#[derive(Debug)]
pub struct SchemaInspector;

impl SchemaInspector {
    /// Analyzes a derived schema and returns a structural report.
    pub fn inspect(schema: &DerivedSchema) -> SchemaReport {
        let tree = FieldInfo {
            name: ROOT_FIELD.to_string(),
            kind: "struct".to_string(),
            data_type: schema.root_data_type().to_string(),
            codec: None,
            children: schema.fields().iter().map(Self::inspect_field).collect(),
        };

        SchemaReport {
            record: schema.name().to_string(),
            type_key: schema.key().to_string(),
            fingerprint: format!("{:016x}", Self::fingerprint(schema)),
            column_count: tree.count(),
            tree,
        }
    }

    /// xxHash64 of the Arrow schema. Equal schemas give equal fingerprints.
    pub fn fingerprint(schema: &DerivedSchema) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        schema.arrow_schema().hash(&mut hasher);
        hasher.finish()
    }

    fn inspect_field(field: &SchemaField) -> FieldInfo {
        Self::inspect_node(&field.name, &field.node)
    }

    fn inspect_node(name: &str, node: &SchemaNode) -> FieldInfo {
        let (codec, children) = match node {
            SchemaNode::Primitive(_) => (None, Vec::new()),
            SchemaNode::Struct(fields) => (None, fields.iter().map(Self::inspect_field).collect()),
            SchemaNode::Map(value) => (None, vec![Self::inspect_node("[value]", value)]),
            SchemaNode::List(element) => (None, vec![Self::inspect_node("[item]", element)]),
            SchemaNode::Binary(handle) => (Some(handle.name().to_string()), Vec::new()),
        };
        FieldInfo {
            name: name.to_string(),
            kind: node.kind_name().to_string(),
            data_type: node.data_type().to_string(),
            codec,
            children,
        }
    }
}

impl FieldInfo {
    fn count(&self) -> usize {
        1 + self.children.iter().map(FieldInfo::count).sum::<usize>()
    }

    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };
        let codec = self
            .codec
            .as_deref()
            .map(|c| format!(" [codec: {}]", c))
            .unwrap_or_default();

        writeln!(f, "{}{}{}: {}{}", prefix, connector, self.name, self.kind, codec)?;

        for (i, child) in self.children.iter().enumerate() {
            let is_last_child = i == self.children.len() - 1;
            child.fmt_recursive(f, &format!("{}{}", prefix, child_prefix), is_last_child)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== TABLECODE SCHEMA REPORT ===")?;
        writeln!(f, "Record:      {} ({})", self.record, self.type_key)?;
        writeln!(f, "Fingerprint: {}", self.fingerprint)?;
        writeln!(f, "Columns:     {}", self.column_count)?;
        writeln!(f, "\n[COLUMNS]")?;
        self.tree.fmt_recursive(f, "", true)
    }
}
