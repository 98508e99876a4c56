//! Row-oriented instance values.
//!
//! [`Value`] is the dynamic form every record instance takes on its way into or out of a
//! table. Typed records convert to and from it through [`crate::record`]; callers with
//! data that only exists at runtime can build [`RecordValue`]s directly.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A single field value.
///
/// Numeric variants compare by value, so `Int(5) == UInt(5)` and `Int(2) == Float(2.0)`.
/// Deserialized numbers come back as the canonical variant of their column kind.
#[derive(Debug, Clone)]
pub enum Value {
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width.
    UInt(u64),
    /// Float of any width.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Str(String),
    /// Byte string stored natively.
    Bytes(Vec<u8>),
    /// Nested record.
    Record(RecordValue),
    /// String-keyed entries in insertion order.
    Map(Vec<(String, Value)>),
    /// List elements.
    List(Vec<Value>),
    /// A value only a codec knows how to turn into bytes.
    Opaque(OpaqueValue),
}

impl Value {
    /// Short description of the variant, used in error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Int(_) => "int".into(),
            Self::UInt(_) => "uint".into(),
            Self::Float(_) => "float".into(),
            Self::Bool(_) => "bool".into(),
            Self::Str(_) => "string".into(),
            Self::Bytes(_) => "bytes".into(),
            Self::Record(_) => "record".into(),
            Self::Map(_) => "map".into(),
            Self::List(_) => "list".into(),
            Self::Opaque(opaque) => format!("opaque {}", opaque.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(i), Self::UInt(u)) | (Self::UInt(u), Self::Int(i)) => {
                u64::try_from(*i).is_ok_and(|i| i == *u)
            }
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => *i as f64 == *f,
            (Self::UInt(u), Self::Float(f)) | (Self::Float(f), Self::UInt(u)) => *u as f64 == *f,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        Self::Record(value)
    }
}

/// An instance of a record type: named field values in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordValue {
    fields: Vec<(String, Value)>,
}

impl RecordValue {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Looks a field up by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the field at `index` if it carries `name`, else searches by name.
    pub(crate) fn get_declared(&self, index: usize, name: &str) -> Option<&Value> {
        match self.fields.get(index) {
            Some((n, v)) if n == name => Some(v),
            _ => self.get(name),
        }
    }

    /// Fields in order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Consumes the record, returning its fields.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RecordValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

type AnyRef<'a> = &'a (dyn Any + Send + Sync);

/// A type-erased value handled by a codec.
///
/// Equality delegates to the wrapped type's `PartialEq`, so two decoded arrays compare
/// element-wise rather than by identity.
#[derive(Clone)]
pub struct OpaqueValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    eq: fn(AnyRef<'_>, AnyRef<'_>) -> bool,
    debug: fn(AnyRef<'_>, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl OpaqueValue {
    /// Wraps a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + PartialEq + fmt::Debug,
    {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
            eq: erased_eq::<T>,
            debug: erased_debug::<T>,
        }
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Takes the wrapped value out as `T`, cloning only if it is shared.
    pub fn into_inner<T>(self) -> std::result::Result<T, Self>
    where
        T: Any + Send + Sync + Clone,
    {
        let Self {
            inner,
            type_name,
            eq,
            debug,
        } = self;
        match inner.downcast::<T>() {
            Ok(typed) => Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone())),
            Err(inner) => Err(Self {
                inner,
                type_name,
                eq,
                debug,
            }),
        }
    }
}

fn erased_eq<T: Any + PartialEq>(a: AnyRef<'_>, b: AnyRef<'_>) -> bool {
    matches!((a.downcast_ref::<T>(), b.downcast_ref::<T>()), (Some(a), Some(b)) if a == b)
}

fn erased_debug<T: Any + fmt::Debug>(value: AnyRef<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(value) => value.fmt(f),
        None => f.write_str("<opaque>"),
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        (self.eq)(self.inner.as_ref(), other.inner.as_ref())
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(self.inner.as_ref(), f)
    }
}

/// A byte string stored as a native binary column.
///
/// Plain `Vec<u8>` is a list of `uint8`; wrap it in `Blob` to get a binary column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
