use std::fmt;

use super::arena::{self, FeatureKind};
use super::{Class, Multiplicity, SchemaError, ValueType};
use crate::base::Name;

/// A structural feature: an attribute or a reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Feature(pub(crate) u32);

impl Feature {
    pub fn name(self) -> Name {
        arena::read(|a| a.feature(self).name.clone())
    }

    /// The class that declares this feature.
    pub fn containing_class(self) -> Class {
        arena::read(|a| a.feature(self).class)
    }

    pub fn multiplicity(self) -> Multiplicity {
        arena::read(|a| a.feature(self).multiplicity)
    }

    pub fn set_multiplicity(self, multiplicity: Multiplicity) {
        arena::write(|a| a.features[self.0 as usize].multiplicity = multiplicity);
    }

    pub fn is_many(self) -> bool {
        self.multiplicity().is_many()
    }

    /// Duplicate values are rejected. Defaults to true for references and
    /// false for attributes.
    pub fn is_unique(self) -> bool {
        arena::read(|a| a.feature(self).unique)
    }

    pub fn set_unique(self, value: bool) {
        arena::write(|a| a.features[self.0 as usize].unique = value);
    }

    /// Transient features are never written to documents.
    pub fn is_transient(self) -> bool {
        arena::read(|a| a.feature(self).transient)
    }

    pub fn set_transient(self, value: bool) {
        arena::write(|a| a.features[self.0 as usize].transient = value);
    }

    pub fn is_attribute(self) -> bool {
        arena::read(|a| matches!(a.feature(self).kind, FeatureKind::Attribute { .. }))
    }

    pub fn is_reference(self) -> bool {
        !self.is_attribute()
    }

    /// The value type of an attribute.
    pub fn value_type(self) -> Option<ValueType> {
        arena::read(|a| match &a.feature(self).kind {
            FeatureKind::Attribute { ty, .. } => Some(ty.clone()),
            FeatureKind::Reference { .. } => None,
        })
    }

    /// Whether this attribute identifies its object within a document.
    pub fn is_id(self) -> bool {
        arena::read(|a| matches!(a.feature(self).kind, FeatureKind::Attribute { id: true, .. }))
    }

    pub fn set_id(self, value: bool) -> Result<(), SchemaError> {
        arena::write(|a| {
            let data = &mut a.features[self.0 as usize];
            match &mut data.kind {
                FeatureKind::Attribute { id, .. } => {
                    *id = value;
                    Ok(())
                }
                FeatureKind::Reference { .. } => Err(SchemaError::NotAnAttribute(data.name.clone())),
            }
        })
    }

    /// Text of the default value of an attribute.
    pub fn default_literal(self) -> Option<Name> {
        arena::read(|a| match &a.feature(self).kind {
            FeatureKind::Attribute { default, .. } => default.clone(),
            FeatureKind::Reference { .. } => None,
        })
    }

    pub fn set_default_literal(self, literal: Option<&str>) -> Result<(), SchemaError> {
        arena::write(|a| {
            let interned = literal.map(|l| a.intern(l));
            let data = &mut a.features[self.0 as usize];
            match &mut data.kind {
                FeatureKind::Attribute { default, .. } => {
                    *default = interned;
                    Ok(())
                }
                FeatureKind::Reference { .. } => Err(SchemaError::NotAnAttribute(data.name.clone())),
            }
        })
    }

    /// The class referenced values must conform to.
    pub fn target(self) -> Option<Class> {
        arena::read(|a| match a.feature(self).kind {
            FeatureKind::Reference { target, .. } => Some(target),
            FeatureKind::Attribute { .. } => None,
        })
    }

    /// Retarget a reference. Used while a schema is still being assembled.
    pub fn set_target(self, class: Class) -> Result<(), SchemaError> {
        arena::write(|a| {
            let data = &mut a.features[self.0 as usize];
            match &mut data.kind {
                FeatureKind::Reference { target, .. } => {
                    *target = class;
                    Ok(())
                }
                FeatureKind::Attribute { .. } => Err(SchemaError::NotAReference(data.name.clone())),
            }
        })
    }

    /// Values are owned by the object holding this reference.
    pub fn is_containment(self) -> bool {
        arena::read(|a| {
            matches!(
                a.feature(self).kind,
                FeatureKind::Reference {
                    containment: true,
                    ..
                }
            )
        })
    }

    pub fn set_containment(self, value: bool) -> Result<(), SchemaError> {
        arena::write(|a| {
            let data = &mut a.features[self.0 as usize];
            match &mut data.kind {
                FeatureKind::Reference { containment, .. } => {
                    *containment = value;
                    Ok(())
                }
                FeatureKind::Attribute { .. } => Err(SchemaError::NotAReference(data.name.clone())),
            }
        })
    }

    pub fn opposite(self) -> Option<Feature> {
        arena::read(|a| match a.feature(self).kind {
            FeatureKind::Reference { opposite, .. } => opposite,
            FeatureKind::Attribute { .. } => None,
        })
    }

    /// The opposite of a containment: points from a child to its container.
    pub fn is_container(self) -> bool {
        self.opposite().is_some_and(Feature::is_containment)
    }

    /// Declare `self` and `other` as opposite ends of one association.
    ///
    /// Both must be references and each must target the class declaring the
    /// other. At most one end may be a containment.
    pub fn set_opposite(self, other: Feature) -> Result<(), SchemaError> {
        arena::write(|a| {
            let ends = [(self, other), (other, self)];
            for (this, that) in ends {
                let data = a.feature(this);
                let FeatureKind::Reference { target, .. } = data.kind else {
                    return Err(SchemaError::NotAReference(data.name.clone()));
                };
                let owner = a.feature(that).class;
                if !a.conforms(owner, target) {
                    return Err(SchemaError::InvalidOpposite(format!(
                        "'{}' targets '{}', not '{}'",
                        data.name,
                        a.class(target).name,
                        a.class(owner).name
                    )));
                }
            }
            let both_containment = ends.iter().all(|(f, _)| {
                matches!(
                    a.feature(*f).kind,
                    FeatureKind::Reference {
                        containment: true,
                        ..
                    }
                )
            });
            if both_containment {
                return Err(SchemaError::InvalidOpposite(format!(
                    "'{}' and '{}' are both containments",
                    a.feature(self).name,
                    a.feature(other).name
                )));
            }
            a.link_opposites(self, other);
            Ok(())
        })
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = arena::try_read(|a| {
            let data = a.feature(*self);
            (a.class(data.class).name.clone(), data.name.clone())
        });
        match names {
            Some((class, name)) => write!(f, "Feature({class}.{name})"),
            None => write!(f, "Feature#{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DataType, Package};

    fn classes(tag: &str) -> (Class, Class) {
        let p = Package::new(tag, &format!("http://feature.test/{tag}"), tag);
        let a = p.define_class("A", &[], false).expect("A");
        let b = p.define_class("B", &[], false).expect("B");
        (a, b)
    }

    #[test]
    fn test_reference_defaults() {
        let (a, b) = classes("ref_defaults");
        let to_b = a
            .add_reference("toB", b, Multiplicity::MANY, false)
            .expect("toB");
        assert!(to_b.is_reference());
        assert!(to_b.is_unique());
        assert!(to_b.is_many());
        assert_eq!(to_b.target(), Some(b));
        assert_eq!(to_b.value_type(), None);
        assert_eq!(to_b.containing_class(), a);
    }

    #[test]
    fn test_attribute_defaults() {
        let (a, _) = classes("attr_defaults");
        let tags = a
            .add_attribute("tags", DataType::String, Multiplicity::MANY)
            .expect("tags");
        assert!(tags.is_attribute());
        assert!(!tags.is_unique());
        assert_eq!(tags.value_type(), Some(ValueType::Data(DataType::String)));
        assert!(matches!(tags.set_target(a), Err(SchemaError::NotAReference(_))));
        tags.set_default_literal(Some("x")).expect("attribute");
        assert_eq!(tags.default_literal().as_deref(), Some("x"));
    }

    #[test]
    fn test_set_opposite_links_both_ends() {
        let (a, b) = classes("opposites");
        let to_b = a
            .add_reference("toB", b, Multiplicity::OPTIONAL, false)
            .expect("toB");
        let to_a = b
            .add_reference("toA", a, Multiplicity::OPTIONAL, false)
            .expect("toA");
        to_b.set_opposite(to_a).expect("opposites");
        assert_eq!(to_b.opposite(), Some(to_a));
        assert_eq!(to_a.opposite(), Some(to_b));
    }

    #[test]
    fn test_relinking_opposite_clears_previous_partner() {
        let (a, b) = classes("relink");
        let to_b = a
            .add_reference("toB", b, Multiplicity::OPTIONAL, false)
            .expect("toB");
        let first = b
            .add_reference("first", a, Multiplicity::OPTIONAL, false)
            .expect("first");
        let second = b
            .add_reference("second", a, Multiplicity::OPTIONAL, false)
            .expect("second");
        to_b.set_opposite(first).expect("first");
        to_b.set_opposite(second).expect("second");
        assert_eq!(first.opposite(), None);
        assert_eq!(to_b.opposite(), Some(second));
    }

    #[test]
    fn test_opposite_must_target_owner() {
        let (a, b) = classes("bad_opposite");
        let to_b = a
            .add_reference("toB", b, Multiplicity::OPTIONAL, false)
            .expect("toB");
        let to_b_again = b
            .add_reference("self", b, Multiplicity::OPTIONAL, false)
            .expect("self");
        assert!(matches!(
            to_b.set_opposite(to_b_again),
            Err(SchemaError::InvalidOpposite(_))
        ));
    }

    #[test]
    fn test_container_end() {
        let (a, b) = classes("container_end");
        let children = a
            .add_reference("children", b, Multiplicity::MANY, true)
            .expect("children");
        let parent = b
            .add_reference("parent", a, Multiplicity::OPTIONAL, false)
            .expect("parent");
        children.set_opposite(parent).expect("opposites");
        assert!(parent.is_container());
        assert!(!children.is_container());
    }
}
