//! # Tablecode
//!
//! Derives Apache Arrow schemas from arbitrarily nested record types and moves batches of
//! records in and out of columnar tables without losing information.
//!
//! ## Overview
//!
//! A record type is described once, either by hand with [`types::RecordType::builder`] or by
//! `#[derive(TableRecord)]`. Tablecode resolves the description into a canonical field-type
//! tree, builds the matching Arrow schema, caches it per type, and then serializes batches of
//! instances into a [`Table`] with a single `root` struct column, and back.
//!
//! ### Key Features
//!
//! *   **Nested Structs:** Records nest to any depth; every nesting level becomes a struct
//!     column whose children follow the declaration order exactly.
//! *   **Maps and Lists:** String-keyed maps become unordered Arrow map columns (`keys` /
//!     `values`), vectors become list columns.
//! *   **Pluggable Codecs:** Types with no columnar shape are stored as binary cells through
//!     an explicitly registered [`codec::Codec`]. N-dimensional arrays ship with a built-in
//!     NPY codec.
//! *   **Memoized Schemas:** Each type is resolved once per engine; later calls are a single
//!     read-locked map lookup.
//! *   **Parallel Codecs:** Large opaque columns encode and decode on Rayon's pool.
//! *   **Path-Aware Errors:** Every failure names the field it happened at, e.g. `Outer.q.z`.
//!
//! ## Architecture
//!
//! ```text
//! RecordType ──► TypeResolver ──► SchemaBuilder ──► DerivedSchema (cached per TypeKey)
//!                     │                                   │
//!               CodecRegistry                 serialize / deserialize
//!                                                         │
//!                                   Vec<RecordValue> ◄──► Table (RecordBatch)
//! ```
//!
//! ## Usage Patterns
//!
//! ### Typed Records
//!
//! ```rust
//! use tablecode::{NdArray, Tablecode, TableRecord};
//! use std::collections::HashMap;
//!
//! #[derive(Debug, Clone, PartialEq, TableRecord)]
//! struct Inner {
//!     z: i64,
//!     a: String,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, TableRecord)]
//! struct Outer {
//!     x: i64,
//!     q: Inner,
//!     nd: HashMap<String, i64>,
//!     samples: NdArray,
//! }
//!
//! let engine = Tablecode::new();
//! let rows = vec![Outer {
//!     x: 1,
//!     q: Inner { z: 2, a: "a".into() },
//!     nd: HashMap::from([("k".to_string(), 3)]),
//!     samples: NdArray::from_vec(vec![0.5f64, 1.5]),
//! }];
//!
//! let table = engine.serialize(&rows)?;
//! assert_eq!(table.num_rows(), 1);
//! assert_eq!(engine.deserialize::<Outer>(&table)?, rows);
//! # Ok::<(), tablecode::TablecodeError>(())
//! ```
//!
//! ### Runtime Descriptors
//!
//! ```rust
//! use tablecode::{Tablecode, types::{DeclaredType, RecordType}, value::RecordValue};
//!
//! let engine = Tablecode::new();
//! let record = RecordType::builder("Point")
//!     .field("x", DeclaredType::FLOAT)
//!     .field("y", DeclaredType::FLOAT)
//!     .build();
//! let schema = engine.register_record_type(&record)?;
//!
//! let points = vec![RecordValue::new().with("x", 1.0).with("y", 2.0)];
//! let table = engine.serialize_values(&schema, &points)?;
//! assert_eq!(engine.deserialize_values(&table, &schema)?, points);
//! # Ok::<(), tablecode::TablecodeError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate forbids `unsafe` code.
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`TablecodeError`] carrying the
//!   field path.
//! * **All-or-Nothing Batches:** a batch either converts completely or fails as a whole.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the derive's `::tablecode::` paths resolve inside this crate.
extern crate self as tablecode;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod codec;
pub mod error;
pub mod format;
pub mod inspector;
pub mod ndarray;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

// --- PIPELINE MODULES ---
pub mod deserialize;
pub mod resolve;
pub mod serialize;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{Tablecode, TablecodeBuilder, TablecodeOptions};
pub use codec::{Codec, CodecKey, CodecRegistry};
pub use error::{CodecError, Result, TablecodeError};
pub use inspector::{SchemaInspector, SchemaReport};
pub use ndarray::NdArray;
pub use record::{FieldValue, Record};
pub use schema::DerivedSchema;
pub use value::{Blob, RecordValue, Value};

// Re-export the derive macro so it is accessible as `tablecode::TableRecord`
pub use tablecode_derive::TableRecord;

/// A columnar table: one non-nullable `root` struct column, one row per record.
pub type Table = arrow::record_batch::RecordBatch;

/// Constants used throughout the library.
pub mod constants {
    /// Opaque columns with at least this many values run their codec on the rayon pool.
    pub const DEFAULT_PARALLEL_THRESHOLD: usize = 256;
}
