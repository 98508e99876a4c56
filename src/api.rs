//! The engine facade.
//!
//! [`Tablecode`] owns the codec registry, the schema cache and the options, and exposes
//! the whole pipeline (register, derive, serialize, deserialize) behind `&self`, so one
//! engine can be shared across threads. [`Tablecode::global`] provides a process-wide
//! instance for applications that do not want to thread one through.

use crate::Table;
use crate::codec::{Codec, CodecKey, CodecRegistry};
use crate::constants::DEFAULT_PARALLEL_THRESHOLD;
use crate::deserialize::deserialize;
use crate::error::{CodecError, Result, TablecodeError};
use crate::record::Record;
use crate::resolve::TypeResolver;
use crate::schema::{DerivedSchema, SchemaBuilder, SchemaCache};
use crate::serialize::{SerializeOptions, empty_table, serialize};
use crate::types::{FieldPath, RecordType, TypeKey};
use crate::value::RecordValue;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablecodeOptions {
    /// Minimum number of values in an opaque column before codec calls are spread over
    /// the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for TablecodeOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl TablecodeOptions {
    fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            parallel_threshold: self.parallel_threshold,
        }
    }
}

/// Builder for [`Tablecode`].
#[derive(Debug, Default)]
pub struct TablecodeBuilder {
    registry: Option<CodecRegistry>,
    options: TablecodeOptions,
}

impl TablecodeBuilder {
    /// Uses `registry` instead of [`CodecRegistry::new`].
    pub fn registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets [`TablecodeOptions::parallel_threshold`].
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.options.parallel_threshold = threshold;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Tablecode {
        Tablecode {
            registry: RwLock::new(self.registry.unwrap_or_default()),
            schemas: SchemaCache::new(),
            options: self.options,
        }
    }
}

/// The main entry point: derives schemas and moves records in and out of tables.
#[derive(Debug)]
pub struct Tablecode {
    registry: RwLock<CodecRegistry>,
    schemas: SchemaCache,
    options: TablecodeOptions,
}

impl Default for Tablecode {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Tablecode> = OnceLock::new();

impl Tablecode {
    /// Creates an engine with the built-in codecs and default options.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring an engine.
    pub fn builder() -> TablecodeBuilder {
        TablecodeBuilder::default()
    }

    /// The process-wide engine, created on first use with default settings.
    pub fn global() -> &'static Tablecode {
        GLOBAL.get_or_init(Tablecode::new)
    }

    /// Current options.
    pub fn options(&self) -> &TablecodeOptions {
        &self.options
    }

    // --- Codecs ---

    /// Registers a codec for an opaque type or type family.
    ///
    /// Schemas already derived keep the codec they were resolved with.
    ///
    /// # Errors
    /// Returns [`TablecodeError::CodecConflict`] if `key` is taken.
    pub fn register_codec(&self, key: CodecKey, codec: Arc<dyn Codec>) -> Result<()> {
        self.registry.write().register(key, codec)
    }

    /// Registers a codec from an encode/decode closure pair.
    ///
    /// # Errors
    /// Returns [`TablecodeError::CodecConflict`] if `key` is taken.
    pub fn register_codec_fn<T, E, D>(&self, key: CodecKey, encode: E, decode: D) -> Result<()>
    where
        T: Any + Send + Sync + PartialEq + fmt::Debug,
        E: Fn(&T) -> std::result::Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> std::result::Result<T, CodecError> + Send + Sync + 'static,
    {
        self.registry.write().register_fn(key, encode, decode)
    }

    /// Registers a bincode codec for a serde type.
    ///
    /// # Errors
    /// Returns [`TablecodeError::CodecConflict`] if `key` is taken.
    pub fn register_serde_codec<T>(&self, key: CodecKey) -> Result<()>
    where
        T: serde::Serialize
            + serde::de::DeserializeOwned
            + Any
            + Send
            + Sync
            + PartialEq
            + fmt::Debug,
    {
        self.registry.write().register_serde::<T>(key)
    }

    /// Number of codec lookups the registry has served.
    pub fn codec_lookup_count(&self) -> usize {
        self.registry.read().lookup_count()
    }

    // --- Schemas ---

    /// Derives (or returns the cached) schema for a record type.
    ///
    /// The first call per type key resolves and builds the schema; later calls return
    /// the same `Arc` without touching the codec registry.
    ///
    /// # Errors
    /// Returns [`TablecodeError::SchemaResolution`] if any field cannot be mapped.
    pub fn register_record_type(&self, record: &RecordType) -> Result<Arc<DerivedSchema>> {
        self.schemas.get_or_try_insert(record.key(), || {
            let registry = self.registry.read();
            let resolved = TypeResolver::new(&registry).resolve(record)?;
            Ok(SchemaBuilder::build(&resolved))
        })
    }

    /// Derives (or returns the cached) schema for a typed record.
    ///
    /// # Errors
    /// Returns [`TablecodeError::SchemaResolution`] if any field cannot be mapped.
    pub fn register<T: Record>(&self) -> Result<Arc<DerivedSchema>> {
        match self.schemas.get(&T::type_key()) {
            Some(schema) => Ok(schema),
            None => self.register_record_type(&T::record_type()),
        }
    }

    /// The cached schema for `key`, if one has been derived.
    pub fn schema_for(&self, key: &TypeKey) -> Option<Arc<DerivedSchema>> {
        self.schemas.get(key)
    }

    // --- Tables ---

    /// Serializes record values into a table of `schema`.
    ///
    /// # Errors
    /// Returns [`TablecodeError::Serialization`] naming the first offending field.
    pub fn serialize_values(&self, schema: &DerivedSchema, records: &[RecordValue]) -> Result<Table> {
        serialize(schema, records, &self.options.serialize_options())
    }

    /// Serializes typed records, deriving their schema on first use.
    ///
    /// # Errors
    /// Returns [`TablecodeError::SchemaResolution`] or [`TablecodeError::Serialization`].
    pub fn serialize<T: Record>(&self, records: &[T]) -> Result<Table> {
        let schema = self.register::<T>()?;
        let values: Vec<RecordValue> = records.iter().map(Record::to_record).collect();
        self.serialize_values(&schema, &values)
    }

    /// Reads a table of `schema` back into record values.
    ///
    /// # Errors
    /// Returns [`TablecodeError::Deserialization`] naming the first offending field.
    pub fn deserialize_values(
        &self,
        table: &Table,
        schema: &DerivedSchema,
    ) -> Result<Vec<RecordValue>> {
        deserialize(table, schema, &self.options.serialize_options())
    }

    /// Reads a table back into typed records.
    ///
    /// # Errors
    /// Returns [`TablecodeError::SchemaResolution`] or [`TablecodeError::Deserialization`].
    pub fn deserialize<T: Record>(&self, table: &Table) -> Result<Vec<T>> {
        let schema = self.register::<T>()?;
        let path = FieldPath::root(schema.name());
        self.deserialize_values(table, &schema)?
            .into_iter()
            .map(|record| T::from_record(record, &path))
            .collect()
    }

    /// A zero-row table with exactly the schema of `schema`.
    pub fn empty_table(&self, schema: &DerivedSchema) -> Table {
        empty_table(schema)
    }

    /// Concatenates tables of `schema` into one.
    ///
    /// # Errors
    /// Returns [`TablecodeError::Serialization`] if a table carries a different schema.
    pub fn concat_tables(&self, schema: &DerivedSchema, tables: &[Table]) -> Result<Table> {
        let path = FieldPath::root(schema.name());
        let expected = schema.arrow_schema();
        if let Some(position) = tables.iter().position(|t| t.schema() != expected) {
            return Err(TablecodeError::serialization(
                &path,
                format!("table {position} does not carry the schema of '{}'", schema.name()),
            ));
        }
        arrow::compute::concat_batches(&expected, tables)
            .map_err(|e| TablecodeError::serialization(&path, e.to_string()))
    }
}
