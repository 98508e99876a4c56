use std::fmt;
use std::sync::Arc;

/// A strong type representing the identity of a record type.
///
/// Schemas are cached per key, so two descriptors sharing a key are treated as the same
/// type. The caller controls the key; the derive macro uses the struct's module path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    /// Creates a new key.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TypeKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
