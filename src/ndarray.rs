//! A minimal N-dimensional numeric array and its built-in codec.
//!
//! [`NdArray`] has no native columnar shape, so fields holding one are stored as binary
//! cells. The [`NdArrayCodec`] writes each array as a self-describing NPY blob (see
//! [`crate::format`]): shape, element type and raw element bytes, readable without any
//! side information and compatible with `numpy.load`.

use crate::codec::Codec;
use crate::error::CodecError;
use crate::format;
use crate::value::OpaqueValue;
use std::fmt;
use thiserror::Error;

/// Opaque type name fields of type [`NdArray`] are declared with.
pub const NDARRAY_TYPE_NAME: &str = "NdArray";

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// `bool`, one byte per element.
    Bool,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `i64`.
    I64,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Flat, C-ordered element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum NdData {
    /// Booleans.
    Bool(Vec<bool>),
    /// `i8` elements.
    I8(Vec<i8>),
    /// `i16` elements.
    I16(Vec<i16>),
    /// `i32` elements.
    I32(Vec<i32>),
    /// `i64` elements.
    I64(Vec<i64>),
    /// `u8` elements.
    U8(Vec<u8>),
    /// `u16` elements.
    U16(Vec<u16>),
    /// `u32` elements.
    U32(Vec<u32>),
    /// `u64` elements.
    U64(Vec<u64>),
    /// `f32` elements.
    F32(Vec<f32>),
    /// `f64` elements.
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            NdData::Bool($v) => $body,
            NdData::I8($v) => $body,
            NdData::I16($v) => $body,
            NdData::I32($v) => $body,
            NdData::I64($v) => $body,
            NdData::U8($v) => $body,
            NdData::U16($v) => $body,
            NdData::U32($v) => $body,
            NdData::U64($v) => $body,
            NdData::F32($v) => $body,
            NdData::F64($v) => $body,
        }
    };
}

impl NdData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::U16(_) => DType::U16,
            Self::U32(_) => DType::U32,
            Self::U64(_) => DType::U64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }
}

/// Scalar types an [`NdArray`] can hold.
pub trait Element: Copy + Send + Sync + 'static {
    /// Wraps a vector of elements.
    fn into_data(values: Vec<Self>) -> NdData;

    /// Borrows the elements if `data` holds this type.
    fn slice(data: &NdData) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl Element for $t {
                fn into_data(values: Vec<Self>) -> NdData {
                    NdData::$variant(values)
                }

                fn slice(data: &NdData) -> Option<&[Self]> {
                    match data {
                        NdData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    }
}

impl_element!(
    bool => Bool, i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, f32 => F32, f64 => F64
);

/// Returned when a shape does not match the number of elements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shape {shape:?} holds {expected} elements, got {actual}")]
pub struct ShapeError {
    /// Requested shape.
    pub shape: Vec<usize>,
    /// Element count implied by the shape.
    pub expected: usize,
    /// Element count supplied.
    pub actual: usize,
}

/// An N-dimensional, C-ordered numeric array.
///
/// Equality is shape plus element-wise value equality.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: NdData,
}

impl NdArray {
    /// A one-dimensional array.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Self {
            shape: vec![values.len()],
            data: T::into_data(values),
        }
    }

    /// An array with an explicit shape.
    ///
    /// # Errors
    /// Returns [`ShapeError`] if the shape's element count differs from `values.len()`.
    pub fn from_shape_vec<T: Element>(
        shape: Vec<usize>,
        values: Vec<T>,
    ) -> std::result::Result<Self, ShapeError> {
        Self::from_data(shape, T::into_data(values))
    }

    /// An array from already typed storage.
    ///
    /// # Errors
    /// Returns [`ShapeError`] if the shape's element count differs from the data length.
    pub fn from_data(shape: Vec<usize>, data: NdData) -> std::result::Result<Self, ShapeError> {
        let expected = element_count(&shape);
        if expected != Some(data.len()) {
            return Err(ShapeError {
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
                shape,
            });
        }
        Ok(Self { shape, data })
    }

    /// An array of `shape` with every element set to `value`.
    ///
    /// # Errors
    /// Returns [`ShapeError`] if the shape's element count overflows `usize`.
    pub fn full<T: Element>(shape: Vec<usize>, value: T) -> std::result::Result<Self, ShapeError> {
        match element_count(&shape) {
            Some(count) => Ok(Self {
                data: T::into_data(vec![value; count]),
                shape,
            }),
            None => Err(ShapeError {
                shape,
                expected: usize::MAX,
                actual: 0,
            }),
        }
    }

    /// Dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Flat element storage.
    pub fn data(&self) -> &NdData {
        &self.data
    }

    /// Borrows the flat elements as `T`, if that is the element type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }
}

pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
}

/// The built-in codec for [`NdArray`], storing NPY v1.0 blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdArrayCodec;

impl Codec for NdArrayCodec {
    fn name(&self) -> &str {
        "npy"
    }

    fn encode(&self, value: &OpaqueValue) -> std::result::Result<Vec<u8>, CodecError> {
        let array = value.downcast_ref::<NdArray>().ok_or_else(|| {
            CodecError::new(format!("expected an NdArray, found {}", value.type_name()))
        })?;
        if element_count(&array.shape) != Some(array.data.len()) {
            return Err(CodecError::new(format!(
                "shape {:?} does not match {} elements",
                array.shape,
                array.data.len()
            )));
        }
        Ok(format::encode_npy(array))
    }

    fn decode(&self, bytes: &[u8]) -> std::result::Result<OpaqueValue, CodecError> {
        format::decode_npy(bytes).map(OpaqueValue::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rejects_overflowing_shape() {
        let err = NdArray::full(vec![usize::MAX, 2], 0u8).expect_err("element count overflows");
        assert_eq!(err.shape, vec![usize::MAX, 2]);

        let ok = NdArray::full(vec![3, 2], 7u8).expect("6 elements");
        assert_eq!(ok.len(), 6);
    }

    #[test]
    fn test_codec_rejects_inconsistent_array() {
        let broken = NdArray {
            shape: vec![4],
            data: NdData::U8(vec![1, 2]),
        };
        let result = NdArrayCodec.encode(&OpaqueValue::new(broken));
        assert!(result.is_err());

        let valid = NdArray::from_vec(vec![1u8, 2]);
        let bytes = NdArrayCodec.encode(&OpaqueValue::new(valid.clone())).expect("encodes");
        let decoded = NdArrayCodec.decode(&bytes).expect("decodes");
        assert_eq!(decoded.downcast_ref::<NdArray>(), Some(&valid));
    }
}
