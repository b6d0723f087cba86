//! Object graph runtime.
//!
//! Model objects live in an [`ObjectGraph`] arena and are addressed by
//! [`ObjectId`]. Every mutation keeps two invariants in step:
//!
//! - **containment tree**: an object has at most one container, and adding
//!   it under a new one silently moves it;
//! - **opposites**: if `R` and `R'` are opposite references, `y ∈ x.R`
//!   exactly when `x ∈ y.R'`.
//!
//! A slot can also hold a proxy for an object of a document that has not
//! been loaded yet. Resolution turns the slot into a forward to the real
//! object, so every holder of the proxy id observes the target.

mod contents;
mod mutate;
mod object;
mod value;

use std::fmt;

use thiserror::Error;

use crate::base::Name;
use crate::meta::{Class, Feature};

pub use contents::AllContents;
pub use object::{GraphMark, ObjectGraph};
pub use value::{FeatureValue, Value};

/// Stable identifier of an object or proxy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised by graph reads and mutations. A failed mutation leaves the
/// graph unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("class '{class}' has no feature '{feature}'")]
    UnknownFeature { class: Name, feature: Name },

    #[error("cannot instantiate abstract class '{0}'")]
    Instantiation(Name),

    #[error("feature '{feature}' expects {expected}, got {found}")]
    TypeMismatch {
        feature: Name,
        expected: String,
        found: String,
    },

    #[error("feature '{feature}': {reason}")]
    Multiplicity { feature: Name, reason: String },

    #[error("adding {child} to '{feature}' of {parent} would create a containment cycle")]
    ContainmentCycle {
        parent: ObjectId,
        feature: Name,
        child: ObjectId,
    },

    #[error("{id} is an unresolved proxy for '{uri}'")]
    UnresolvedProxy { id: ObjectId, uri: String },

    #[error("no object {0}")]
    NoSuchObject(ObjectId),
}

impl ModelError {
    pub(crate) fn multiplicity(feature: Feature, reason: impl Into<String>) -> Self {
        Self::Multiplicity {
            feature: feature.name(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(feature: Feature, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            feature: feature.name(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Anything that names a feature: a [`Feature`] handle or a feature name.
pub trait AsFeature {
    /// The feature of `class` this argument designates.
    fn feature_of(&self, class: Class) -> Result<Feature, ModelError>;
}

impl AsFeature for Feature {
    fn feature_of(&self, class: Class) -> Result<Feature, ModelError> {
        if class.conforms_to(self.containing_class()) {
            Ok(*self)
        } else {
            Err(ModelError::UnknownFeature {
                class: class.name(),
                feature: self.name(),
            })
        }
    }
}

impl AsFeature for str {
    fn feature_of(&self, class: Class) -> Result<Feature, ModelError> {
        class.feature(self).ok_or_else(|| ModelError::UnknownFeature {
            class: class.name(),
            feature: self.into(),
        })
    }
}

impl AsFeature for String {
    fn feature_of(&self, class: Class) -> Result<Feature, ModelError> {
        self.as_str().feature_of(class)
    }
}

impl<T: AsFeature + ?Sized> AsFeature for &T {
    fn feature_of(&self, class: Class) -> Result<Feature, ModelError> {
        (**self).feature_of(class)
    }
}
