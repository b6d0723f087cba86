use std::fmt;

use super::arena::{self, FeatureKind};
use super::{Classifier, Feature, Multiplicity, Package, SchemaError, ValueType};
use crate::base::Name;

/// A class of model objects.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Class(pub(crate) u32);

impl Class {
    /// Create a class outside of any package. Use [`Package::define_class`]
    /// for classes that should be reachable through a registry.
    ///
    /// Fails with [`SchemaError::Conflict`] when two supertypes contribute
    /// different features of the same name.
    pub fn new(name: &str, supertypes: &[Class], is_abstract: bool) -> Result<Class, SchemaError> {
        arena::write(|a| {
            a.check_supertypes(name, supertypes)?;
            Ok(a.push_class(None, name, supertypes, is_abstract))
        })
    }

    pub fn name(self) -> Name {
        arena::read(|a| a.class(self).name.clone())
    }

    pub fn package(self) -> Option<Package> {
        arena::read(|a| a.class(self).package)
    }

    /// Whether instances can be created directly.
    pub fn is_abstract(self) -> bool {
        arena::read(|a| a.class(self).is_abstract)
    }

    pub fn set_abstract(self, value: bool) {
        arena::write(|a| a.classes[self.0 as usize].is_abstract = value);
    }

    pub fn is_interface(self) -> bool {
        arena::read(|a| a.class(self).is_interface)
    }

    pub fn set_interface(self, value: bool) {
        arena::write(|a| a.classes[self.0 as usize].is_interface = value);
    }

    /// Whether this class or any of its ancestors is declared abstract.
    pub fn has_abstract_lineage(self) -> bool {
        arena::read(|a| {
            a.class(self).is_abstract
                || a.all_supertypes(self)
                    .iter()
                    .any(|s| a.class(*s).is_abstract)
        })
    }

    /// Direct supertypes in declaration order.
    pub fn supertypes(self) -> Vec<Class> {
        arena::read(|a| a.class(self).supertypes.clone())
    }

    /// All ancestors, each listed once.
    pub fn all_supertypes(self) -> Vec<Class> {
        arena::read(|a| a.all_supertypes(self))
    }

    /// Add a direct supertype. Fails if any inherited feature name would
    /// clash in this class or one of its subclasses.
    pub fn add_supertype(self, supertype: Class) -> Result<(), SchemaError> {
        arena::write(|a| a.add_supertype(self, supertype))
    }

    /// `self` is `other` or a (transitive) subclass of it. Every class
    /// conforms to `EObject`.
    pub fn conforms_to(self, other: Class) -> bool {
        arena::read(|a| a.conforms(self, other))
    }

    /// Features declared on this class.
    pub fn features(self) -> Vec<Feature> {
        arena::read(|a| a.class(self).features.clone())
    }

    /// Inherited and own features, inherited first.
    pub fn all_features(self) -> Vec<Feature> {
        arena::read(|a| a.all_features(self))
    }

    pub fn feature(self, name: &str) -> Option<Feature> {
        arena::read(|a| a.find_feature(self, name))
    }

    /// Containment references, inherited first.
    pub fn containments(self) -> Vec<Feature> {
        arena::read(|a| {
            a.all_features(self)
                .into_iter()
                .filter(|f| {
                    matches!(
                        a.feature(*f).kind,
                        FeatureKind::Reference {
                            containment: true,
                            ..
                        }
                    )
                })
                .collect()
        })
    }

    /// The first attribute flagged as an ID, if any.
    pub fn id_attribute(self) -> Option<Feature> {
        arena::read(|a| {
            a.all_features(self).into_iter().find(|f| {
                matches!(a.feature(*f).kind, FeatureKind::Attribute { id: true, .. })
            })
        })
    }

    /// Declare an attribute.
    pub fn add_attribute(
        self,
        name: &str,
        ty: impl Into<ValueType>,
        multiplicity: Multiplicity,
    ) -> Result<Feature, SchemaError> {
        let kind = FeatureKind::Attribute {
            ty: ty.into(),
            id: false,
            default: None,
        };
        self.add_feature(name, multiplicity, kind)
    }

    /// Declare a reference to instances of `target`.
    pub fn add_reference(
        self,
        name: &str,
        target: Class,
        multiplicity: Multiplicity,
        containment: bool,
    ) -> Result<Feature, SchemaError> {
        let kind = FeatureKind::Reference {
            target,
            containment,
            opposite: None,
        };
        self.add_feature(name, multiplicity, kind)
    }

    fn add_feature(
        self,
        name: &str,
        multiplicity: Multiplicity,
        kind: FeatureKind,
    ) -> Result<Feature, SchemaError> {
        let feature = arena::write(|a| {
            a.check_new_feature(self, name)?;
            Ok::<_, SchemaError>(a.push_feature(self, name, multiplicity, kind))
        })?;
        tracing::trace!(class = %self.name(), feature = name, "declared feature");
        Ok(feature)
    }

    /// `nsURI#//Name`, if the class belongs to a package.
    pub fn uri(self) -> Option<String> {
        Classifier::Class(self).uri()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match arena::try_read(|a| a.class(*self).name.clone()) {
            Some(name) => write!(f, "Class({name})"),
            None => write!(f, "Class#{}", self.0),
        }
    }
}
