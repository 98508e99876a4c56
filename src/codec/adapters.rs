use super::Codec;
use crate::error::CodecError;
use crate::value::OpaqueValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;

fn unexpected_type<T>(value: &OpaqueValue) -> CodecError {
    CodecError::new(format!(
        "expected a value of type {}, found {}",
        type_name::<T>(),
        value.type_name()
    ))
}

// --- Closure Pair ---

/// A codec assembled from an encode closure and a decode closure for one Rust type.
pub struct FnCodec<T, E, D> {
    encode: E,
    decode: D,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E, D> FnCodec<T, E, D> {
    /// Creates the codec.
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            _marker: PhantomData,
        }
    }
}

impl<T, E, D> fmt::Debug for FnCodec<T, E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnCodec<{}>", type_name::<T>())
    }
}

impl<T, E, D> Codec for FnCodec<T, E, D>
where
    T: Any + Send + Sync + PartialEq + fmt::Debug,
    E: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync,
{
    fn name(&self) -> &str {
        type_name::<T>()
    }

    fn encode(&self, value: &OpaqueValue) -> Result<Vec<u8>, CodecError> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| unexpected_type::<T>(value))?;
        (self.encode)(typed)
    }

    fn decode(&self, bytes: &[u8]) -> Result<OpaqueValue, CodecError> {
        (self.decode)(bytes).map(OpaqueValue::new)
    }
}

// --- Serde (bincode) ---

/// A codec for any serde type, storing the bincode standard encoding.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    /// Creates the codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BincodeCodec<{}>", type_name::<T>())
    }
}

impl<T> Codec for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned + Any + Send + Sync + PartialEq + fmt::Debug,
{
    fn name(&self) -> &str {
        "bincode"
    }

    fn encode(&self, value: &OpaqueValue) -> Result<Vec<u8>, CodecError> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| unexpected_type::<T>(value))?;
        bincode::serde::encode_to_vec(typed, bincode::config::standard())
            .map_err(|e| CodecError::new(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<OpaqueValue, CodecError> {
        let (typed, read) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())
                .map_err(|e| CodecError::new(e.to_string()))?;
        if read != bytes.len() {
            return Err(CodecError::new(format!(
                "{} trailing bytes after bincode payload",
                bytes.len() - read
            )));
        }
        Ok(OpaqueValue::new(typed))
    }
}
