//! Pluggable codecs for types without a native columnar shape.
//!
//! A field whose declared type is [`Opaque`](crate::types::DeclaredType::Opaque) is stored
//! as a binary cell. This module defines the [`Codec`] trait that turns such values into
//! bytes and back, and the [`CodecRegistry`] the type resolver consults.
//!
//! Lookup is exact-type-first: `Matrix<f32>` finds a codec registered for
//! [`CodecKey::Exact("Matrix<f32>")`](CodecKey::Exact) before falling back to one
//! registered for the family [`CodecKey::Family("Matrix")`](CodecKey::Family). There is no
//! generic catch-all: an opaque type nobody registered fails resolution.

mod adapters;

pub use adapters::{BincodeCodec, FnCodec};

use crate::error::{CodecError, Result, TablecodeError};
use crate::ndarray::NdArrayCodec;
use crate::types::OpaqueType;
use crate::value::OpaqueValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Interface for opaque value codecs.
///
/// Implementors must be stateless and deterministic, and `decode(encode(v))` must equal
/// `v` for every value the type can produce.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short name shown in schema reports.
    fn name(&self) -> &str;

    /// Encodes a value into a self-contained byte blob.
    fn encode(&self, value: &OpaqueValue) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decodes a blob produced by [`encode`](Self::encode).
    fn decode(&self, bytes: &[u8]) -> std::result::Result<OpaqueValue, CodecError>;
}

/// Key a codec is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodecKey {
    /// Matches one opaque type name exactly.
    Exact(String),
    /// Matches every opaque type whose generic base name is this.
    Family(String),
}

impl CodecKey {
    /// Exact key.
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    /// Family key.
    pub fn family(name: impl Into<String>) -> Self {
        Self::Family(name.into())
    }
}

impl fmt::Display for CodecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => write!(f, "type '{name}'"),
            Self::Family(name) => write!(f, "type family '{name}'"),
        }
    }
}

/// A resolved codec, as stored in the field-type and schema trees.
#[derive(Clone)]
pub struct CodecHandle {
    key: CodecKey,
    codec: Arc<dyn Codec>,
}

impl CodecHandle {
    /// The key the codec was found under.
    pub fn key(&self) -> &CodecKey {
        &self.key
    }

    /// The codec's display name.
    pub fn name(&self) -> &str {
        self.codec.name()
    }

    /// Encodes one value.
    pub fn encode(&self, value: &OpaqueValue) -> std::result::Result<Vec<u8>, CodecError> {
        self.codec.encode(value)
    }

    /// Decodes one value.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<OpaqueValue, CodecError> {
        self.codec.decode(bytes)
    }
}

impl PartialEq for CodecHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for CodecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecHandle({}, {})", self.key, self.codec.name())
    }
}

/// Centralized registry of opaque type codecs.
#[derive(Debug)]
pub struct CodecRegistry {
    codecs: HashMap<CodecKey, Arc<dyn Codec>>,
    lookups: AtomicUsize,
}

impl CodecRegistry {
    /// Creates a registry with the built-in codecs registered.
    ///
    /// *   `Family("NdArray")`: [`NdArrayCodec`]
    pub fn new() -> Self {
        let mut codecs: HashMap<CodecKey, Arc<dyn Codec>> = HashMap::new();
        codecs.insert(CodecKey::family(crate::ndarray::NDARRAY_TYPE_NAME), Arc::new(NdArrayCodec));
        Self {
            codecs,
            lookups: AtomicUsize::new(0),
        }
    }

    /// Creates a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Registers a codec.
    ///
    /// # Errors
    /// Returns [`TablecodeError::CodecConflict`] if the key is already taken.
    pub fn register(&mut self, key: CodecKey, codec: Arc<dyn Codec>) -> Result<()> {
        if self.codecs.contains_key(&key) {
            return Err(TablecodeError::CodecConflict { key });
        }
        tracing::debug!(key = %key, codec = codec.name(), "registered codec");
        self.codecs.insert(key, codec);
        Ok(())
    }

    /// Registers a codec built from an encode/decode closure pair.
    pub fn register_fn<T, E, D>(&mut self, key: CodecKey, encode: E, decode: D) -> Result<()>
    where
        T: std::any::Any + Send + Sync + PartialEq + fmt::Debug,
        E: Fn(&T) -> std::result::Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> std::result::Result<T, CodecError> + Send + Sync + 'static,
    {
        self.register(key, Arc::new(FnCodec::new(encode, decode)))
    }

    /// Registers a bincode codec for a serde type.
    pub fn register_serde<T>(&mut self, key: CodecKey) -> Result<()>
    where
        T: serde::Serialize
            + serde::de::DeserializeOwned
            + std::any::Any
            + Send
            + Sync
            + PartialEq
            + fmt::Debug,
    {
        self.register(key, Arc::new(BincodeCodec::<T>::new()))
    }

    /// Finds the codec for an opaque type: exact name first, then its family.
    pub fn lookup(&self, ty: &OpaqueType) -> Option<CodecHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let exact = CodecKey::exact(ty.name());
        if let Some(codec) = self.codecs.get(&exact) {
            tracing::trace!(ty = %ty, key = %exact, "codec lookup hit");
            return Some(CodecHandle {
                key: exact,
                codec: Arc::clone(codec),
            });
        }

        let family = CodecKey::family(ty.family());
        let codec = self.codecs.get(&family)?;
        tracing::trace!(ty = %ty, key = %family, "codec lookup hit");
        Some(CodecHandle {
            key: family,
            codec: Arc::clone(codec),
        })
    }

    /// Returns true if a codec is registered under `key`.
    pub fn contains(&self, key: &CodecKey) -> bool {
        self.codecs.contains_key(key)
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of registered codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
