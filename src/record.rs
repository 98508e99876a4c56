//! The typed record layer.
//!
//! [`Record`] is what `#[derive(TableRecord)]` implements for a struct: it produces the
//! struct's [`RecordType`] descriptor and converts instances to and from
//! [`RecordValue`]s. [`FieldValue`] is the per-field half of the contract and is
//! implemented here for the standard scalar and container types.
//!
//! ```rust
//! use tablecode::{Tablecode, TableRecord};
//! use std::collections::BTreeMap;
//!
//! #[derive(Debug, Clone, PartialEq, TableRecord)]
//! struct Reading {
//!     sensor: String,
//!     value: f64,
//!     labels: BTreeMap<String, i64>,
//! }
//!
//! let engine = Tablecode::new();
//! let readings = vec![Reading { sensor: "t1".into(), value: 21.5, labels: BTreeMap::new() }];
//! let table = engine.serialize(&readings)?;
//! assert_eq!(engine.deserialize::<Reading>(&table)?, readings);
//! # Ok::<(), tablecode::TablecodeError>(())
//! ```

use crate::error::Result;
use crate::rt;
use crate::types::{DeclaredType, FieldPath, PrimitiveKind, RecordType, TypeKey};
use crate::value::{Blob, RecordValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// A Rust type that can be a record type's field.
pub trait FieldValue: Sized {
    /// The declared type of fields of this Rust type.
    fn declared_type() -> DeclaredType;

    /// Converts to the dynamic representation.
    fn to_value(&self) -> Value;

    /// Converts back from the dynamic representation.
    ///
    /// # Errors
    /// Returns [`TablecodeError::Deserialization`](crate::TablecodeError::Deserialization)
    /// at `path` if the value has the wrong shape or does not fit.
    fn from_value(value: Value, path: &FieldPath) -> Result<Self>;
}

/// A Rust struct that maps onto a record type.
///
/// Usually derived with `#[derive(TableRecord)]`.
pub trait Record: Sized {
    /// Identity the schema is cached under.
    fn type_key() -> TypeKey;

    /// The full descriptor of this record type.
    fn record_type() -> RecordType;

    /// Converts an instance into a record value, fields in declaration order.
    fn to_record(&self) -> RecordValue;

    /// Rebuilds an instance from a record value read at `path`.
    ///
    /// # Errors
    /// Returns [`TablecodeError::Deserialization`](crate::TablecodeError::Deserialization)
    /// for missing fields or values that do not convert.
    fn from_record(record: RecordValue, path: &FieldPath) -> Result<Self>;
}

// --- Scalars ---

macro_rules! impl_signed {
    ($($t:ty => $kind:ident),*) => {
        $(
            impl FieldValue for $t {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Primitive(PrimitiveKind::$kind)
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
                    match value {
                        Value::Int(i) => <$t>::try_from(i).map_err(|_| rt::out_of_range(path, i, stringify!($t))),
                        Value::UInt(u) => <$t>::try_from(u).map_err(|_| rt::out_of_range(path, u, stringify!($t))),
                        other => Err(rt::type_mismatch(path, stringify!($t), &other)),
                    }
                }
            }
        )*
    }
}

macro_rules! impl_unsigned {
    ($($t:ty => $kind:ident),*) => {
        $(
            impl FieldValue for $t {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Primitive(PrimitiveKind::$kind)
                }

                fn to_value(&self) -> Value {
                    Value::UInt(u64::from(*self))
                }

                fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
                    match value {
                        Value::UInt(u) => <$t>::try_from(u).map_err(|_| rt::out_of_range(path, u, stringify!($t))),
                        Value::Int(i) => <$t>::try_from(i).map_err(|_| rt::out_of_range(path, i, stringify!($t))),
                        other => Err(rt::type_mismatch(path, stringify!($t), &other)),
                    }
                }
            }
        )*
    }
}

impl_signed!(i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64);
impl_unsigned!(u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64);

impl FieldValue for f64 {
    fn declared_type() -> DeclaredType {
        DeclaredType::FLOAT
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(rt::type_mismatch(path, "f64", &other)),
        }
    }
}

impl FieldValue for f32 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(PrimitiveKind::Float32)
    }

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f as f32),
            other => Err(rt::type_mismatch(path, "f32", &other)),
        }
    }
}

impl FieldValue for bool {
    fn declared_type() -> DeclaredType {
        DeclaredType::BOOL
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(rt::type_mismatch(path, "bool", &other)),
        }
    }
}

impl FieldValue for String {
    fn declared_type() -> DeclaredType {
        DeclaredType::STRING
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(rt::type_mismatch(path, "string", &other)),
        }
    }
}

impl FieldValue for Blob {
    fn declared_type() -> DeclaredType {
        DeclaredType::BYTES
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.0.clone())
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        match value {
            Value::Bytes(bytes) => Ok(Blob(bytes)),
            other => Err(rt::type_mismatch(path, "bytes", &other)),
        }
    }
}

// --- Containers ---

impl<T: FieldValue> FieldValue for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        let items = match value {
            Value::List(items) => items,
            other => return Err(rt::type_mismatch(path, "list", &other)),
        };
        let item_path = path.element("item");
        items
            .into_iter()
            .map(|item| T::from_value(item, &item_path))
            .collect()
    }
}

impl<V: FieldValue, S: BuildHasher + Default> FieldValue for HashMap<String, V, S> {
    fn declared_type() -> DeclaredType {
        DeclaredType::map(V::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => return Err(rt::type_mismatch(path, "map", &other)),
        };
        let value_path = path.element("value");
        entries
            .into_iter()
            .map(|(k, v)| V::from_value(v, &value_path).map(|v| (k, v)))
            .collect()
    }
}

impl<V: FieldValue> FieldValue for BTreeMap<String, V> {
    fn declared_type() -> DeclaredType {
        DeclaredType::map(V::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn from_value(value: Value, path: &FieldPath) -> Result<Self> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => return Err(rt::type_mismatch(path, "map", &other)),
        };
        let value_path = path.element("value");
        entries
            .into_iter()
            .map(|(k, v)| V::from_value(v, &value_path).map(|v| (k, v)))
            .collect()
    }
}

// --- Opaque ---

/// Implements [`FieldValue`] for a type stored through a registered codec.
///
/// The type must be `Clone + PartialEq + Debug + Send + Sync + 'static`, and a codec must be
/// registered for `$name` (or its family) before a record using it is registered.
///
/// ```rust
/// use tablecode::{opaque_field, codec::CodecKey, Tablecode, TableRecord};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Polygon(Vec<(f64, f64)>);
/// opaque_field!(Polygon, "Polygon");
///
/// #[derive(Debug, Clone, PartialEq, TableRecord)]
/// struct Parcel {
///     id: u32,
///     outline: Polygon,
/// }
///
/// let engine = Tablecode::new();
/// engine.register_serde_codec::<Polygon>(CodecKey::exact("Polygon"))?;
/// let parcels = vec![Parcel { id: 7, outline: Polygon(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]) }];
/// let table = engine.serialize(&parcels)?;
/// assert_eq!(engine.deserialize::<Parcel>(&table)?, parcels);
/// # Ok::<(), tablecode::TablecodeError>(())
/// ```
#[macro_export]
macro_rules! opaque_field {
    ($ty:ty, $name:expr) => {
        impl $crate::record::FieldValue for $ty {
            fn declared_type() -> $crate::types::DeclaredType {
                $crate::types::DeclaredType::opaque($name)
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Opaque($crate::value::OpaqueValue::new(
                    ::std::clone::Clone::clone(self),
                ))
            }

            fn from_value(
                value: $crate::value::Value,
                path: &$crate::types::FieldPath,
            ) -> $crate::Result<Self> {
                $crate::rt::take_opaque::<Self>(value, path)
            }
        }
    };
}

opaque_field!(crate::ndarray::NdArray, crate::ndarray::NDARRAY_TYPE_NAME);
