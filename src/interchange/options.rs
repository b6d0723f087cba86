//! Save options

use serde::{Deserialize, Serialize};

/// Options recognized when writing a document. Options apply to one save
/// call; successive saves of the same resource may use different settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Tag every contained object with its concrete class (`xmi:type` in
    /// XMI, `eClass` in JSON), not only where the class differs from the
    /// feature's declared type.
    pub use_explicit_type_tag: bool,
    /// Give every object a generated identifier and reference objects by it.
    pub use_uuid: bool,
    /// Number of spaces per indentation level
    pub indent: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            use_explicit_type_tag: false,
            use_uuid: false,
            indent: 2,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit_type_tag(mut self, value: bool) -> Self {
        self.use_explicit_type_tag = value;
        self
    }

    pub fn with_uuid(mut self, value: bool) -> Self {
        self.use_uuid = value;
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_tag_only_when_needed() {
        let options = SaveOptions::default();
        assert!(!options.use_explicit_type_tag);
        assert!(!options.use_uuid);
        assert_eq!(options.indent, 2);
    }

    #[test]
    fn test_partial_options_from_json() {
        let options: SaveOptions =
            serde_json::from_str(r#"{"use_explicit_type_tag": true}"#).expect("valid options");
        assert!(options.use_explicit_type_tag);
        assert_eq!(options.indent, 2);
    }
}
