use std::fmt;

/// Location of a field inside a record, rendered as `Type.field.sub`.
///
/// Container elements get bracketed segments: `Type.tags[value]`, `Type.points[item]`.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Starts a path at a record type.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Returns the path of a named child field.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Returns the path of a container element (`[key]`, `[value]`, `[item]`).
    pub fn element(&self, label: &str) -> Self {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => {
                last.push('[');
                last.push_str(label);
                last.push(']');
            }
            None => segments.push(format!("[{label}]")),
        }
        Self { segments }
    }

    /// Returns the individual segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({self})")
    }
}
