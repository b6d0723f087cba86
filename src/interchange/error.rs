//! Decoding and encoding failures for model documents.

use thiserror::Error;

use crate::graph::ModelError;

#[derive(Debug, Error)]
pub enum InterchangeError {
    /// The XML layer rejected the document.
    #[error("XML error: {0}")]
    Xml(String),

    /// The JSON layer rejected the document.
    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A namespace URI with no registered package.
    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    /// A type tag naming a class the package does not define.
    #[error("Unknown class '{name}' in package '{package}'")]
    UnknownClass { package: String, name: String },

    /// An element or key that matches no feature of the object's class.
    #[error("Class '{class}' has no feature '{feature}'")]
    UnknownFeature { class: String, feature: String },

    /// Text that cannot be decoded for the feature's type.
    #[error("Invalid value for '{feature}': {message}")]
    InvalidValue { feature: String, message: String },

    /// The document lacks a mandatory element or key.
    #[error("Document has no {kind} '{name}'")]
    Missing { kind: &'static str, name: String },

    /// Content that is well-formed but cannot be mapped onto the graph.
    #[error("Malformed model document: {0}")]
    Malformed(String),

    /// A reference whose target cannot be addressed or found.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A graph operation rejected the decoded content.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl InterchangeError {
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    pub fn json(message: impl Into<String>) -> Self {
        Self::Json(message.into())
    }

    pub fn unknown_class(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownClass {
            package: package.into(),
            name: name.into(),
        }
    }

    pub fn unknown_feature(class: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::UnknownFeature {
            class: class.into(),
            feature: feature.into(),
        }
    }

    pub fn invalid_value(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            feature: feature.into(),
            message: message.into(),
        }
    }

    /// No root element in an XML document.
    pub fn missing_element(name: impl Into<String>) -> Self {
        Self::Missing {
            kind: "element",
            name: name.into(),
        }
    }

    /// A JSON object without a mandatory key such as `eClass`.
    pub fn missing_key(name: impl Into<String>) -> Self {
        Self::Missing {
            kind: "key",
            name: name.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_item() {
        let err = InterchangeError::unknown_feature("Thing", "colour");
        assert_eq!(err.to_string(), "Class 'Thing' has no feature 'colour'");
        let err = InterchangeError::missing_key("eClass");
        assert_eq!(err.to_string(), "Document has no key 'eClass'");
    }

    #[test]
    fn test_model_errors_pass_through() {
        let err: InterchangeError = ModelError::Instantiation("AbsA".into()).into();
        assert_eq!(err.to_string(), "cannot instantiate abstract class 'AbsA'");
        assert!(matches!(err, InterchangeError::Model(_)));
    }
}
