use std::fmt;

use super::arena::{self, FeatureKind};
use super::{Class, Classifier, Enumeration, SchemaError};
use crate::base::Name;

/// A namespace of classifiers identified by its nsURI.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Package(pub(crate) u32);

impl Package {
    /// Create a package. Packages are not registered anywhere until added to
    /// a registry.
    pub fn new(name: &str, ns_uri: &str, ns_prefix: &str) -> Package {
        let p = arena::write(|a| a.push_package(name, ns_uri, ns_prefix));
        tracing::debug!(name, ns_uri, "defined package");
        p
    }

    pub fn name(self) -> Name {
        arena::read(|a| a.package(self).name.clone())
    }

    pub fn ns_uri(self) -> Name {
        arena::read(|a| a.package(self).ns_uri.clone())
    }

    pub fn ns_prefix(self) -> Name {
        arena::read(|a| a.package(self).ns_prefix.clone())
    }

    pub fn classifiers(self) -> Vec<Classifier> {
        arena::read(|a| a.package(self).classifiers.clone())
    }

    pub fn classifier(self, name: &str) -> Option<Classifier> {
        arena::read(|a| {
            a.package(self)
                .classifiers
                .iter()
                .copied()
                .find(|c| &*a.classifier_name(*c) == name)
        })
    }

    pub fn class(self, name: &str) -> Option<Class> {
        self.classifier(name).and_then(Classifier::as_class)
    }

    pub fn enumeration(self, name: &str) -> Option<Enumeration> {
        self.classifier(name).and_then(Classifier::as_enum)
    }

    /// Look up a classifier by `/`-separated path through subpackages
    /// (`"sub/Class"`).
    pub fn classifier_at(self, path: &str) -> Option<Classifier> {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let last = segments.pop()?;
        let mut package = self;
        for seg in segments {
            package = package.subpackage(seg)?;
        }
        package.classifier(last)
    }

    /// Define a class in this package.
    pub fn define_class(
        self,
        name: &str,
        supertypes: &[Class],
        is_abstract: bool,
    ) -> Result<Class, SchemaError> {
        let class = arena::write(|a| {
            a.check_new_classifier(self, name)?;
            a.check_supertypes(name, supertypes)?;
            Ok::<_, SchemaError>(a.push_class(Some(self), name, supertypes, is_abstract))
        })?;
        tracing::trace!(name, "defined class");
        Ok(class)
    }

    /// Define an enumeration whose literal values are their positions.
    pub fn define_enum(self, name: &str, literals: &[&str]) -> Result<Enumeration, SchemaError> {
        for (i, l) in literals.iter().enumerate() {
            if literals[..i].contains(l) {
                return Err(SchemaError::DuplicateLiteral {
                    enumeration: name.into(),
                    literal: (*l).into(),
                });
            }
        }
        arena::write(|a| {
            a.check_new_classifier(self, name)?;
            Ok(a.push_enum(Some(self), name, literals))
        })
    }

    /// Move a free-standing class or enumeration into this package.
    pub fn add(self, classifier: impl Into<Classifier>) -> Result<(), SchemaError> {
        let classifier = classifier.into();
        arena::write(|a| a.adopt(self, classifier))
    }

    pub fn subpackages(self) -> Vec<Package> {
        arena::read(|a| a.package(self).subpackages.clone())
    }

    pub fn subpackage(self, name: &str) -> Option<Package> {
        arena::read(|a| {
            a.package(self)
                .subpackages
                .iter()
                .copied()
                .find(|p| &*a.package(*p).name == name)
        })
    }

    pub fn super_package(self) -> Option<Package> {
        arena::read(|a| a.package(self).super_package)
    }

    /// Nest `sub` in this package.
    pub fn add_subpackage(self, sub: Package) -> Result<(), SchemaError> {
        arena::write(|a| {
            if let Some(owner) = a.package(sub).super_package {
                if owner == self {
                    return Ok(());
                }
                return Err(SchemaError::AlreadyOwned {
                    classifier: a.package(sub).name.clone(),
                    package: a.package(owner).name.clone(),
                });
            }
            a.packages[sub.0 as usize].super_package = Some(self);
            a.packages[self.0 as usize].subpackages.push(sub);
            Ok(())
        })
    }

    /// The outermost package containing this one.
    pub fn root(self) -> Package {
        let mut current = self;
        while let Some(parent) = current.super_package() {
            current = parent;
        }
        current
    }

    /// This package followed by all nested subpackages, depth first.
    pub fn all_packages(self) -> Vec<Package> {
        let mut out = vec![self];
        for sub in self.subpackages() {
            out.extend(sub.all_packages());
        }
        out
    }

    /// Packages, other than this one's tree, that its classes point into.
    pub fn dependencies(self) -> Vec<Package> {
        let tree = self.all_packages();
        arena::read(|a| {
            let mut deps = Vec::new();
            let mut note = |p: Option<Package>| {
                if let Some(p) = p {
                    if !tree.contains(&p) && !deps.contains(&p) {
                        deps.push(p);
                    }
                }
            };
            for pkg in &tree {
                for c in &a.package(*pkg).classifiers {
                    let Classifier::Class(class) = c else { continue };
                    for s in &a.class(*class).supertypes {
                        note(a.class(*s).package);
                    }
                    for f in &a.class(*class).features {
                        match &a.feature(*f).kind {
                            FeatureKind::Reference { target, .. } => note(a.class(*target).package),
                            FeatureKind::Attribute {
                                ty: super::ValueType::Enum(e),
                                ..
                            } => note(a.enumeration(*e).package),
                            FeatureKind::Attribute { .. } => {}
                        }
                    }
                }
            }
            deps
        })
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match arena::try_read(|a| a.package(*self).name.clone()) {
            Some(name) => write!(f, "Package({name})"),
            None => write!(f, "Package#{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup_classifiers() {
        let p = Package::new("pkg_lookup", "http://pkg.lookup/1.0", "pl");
        let a = p.define_class("A", &[], false).expect("define A");
        let e = p.define_enum("Color", &["red", "green"]).expect("define enum");
        assert_eq!(p.class("A"), Some(a));
        assert_eq!(p.enumeration("Color"), Some(e));
        assert_eq!(p.class("Color"), None);
        assert_eq!(p.classifiers().len(), 2);
    }

    #[test]
    fn test_duplicate_classifier_rejected() {
        let p = Package::new("pkg_dup", "http://pkg.dup/1.0", "pd");
        p.define_class("A", &[], false).expect("define A");
        let err = p.define_class("A", &[], false).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateClassifier { .. }));
        let err = p.define_enum("A", &["x"]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateClassifier { .. }));
    }

    #[test]
    fn test_subpackage_paths() {
        let root = Package::new("outer", "http://outer/1.0", "outer");
        let inner = Package::new("inner", "http://outer/1.0/inner", "inner");
        root.add_subpackage(inner).expect("nest");
        let c = inner.define_class("Deep", &[], false).expect("define");
        assert_eq!(root.classifier_at("inner/Deep"), Some(Classifier::Class(c)));
        assert_eq!(inner.root(), root);
        assert_eq!(Classifier::from(c).fragment(), "//inner/Deep");
        assert_eq!(root.all_packages(), vec![root, inner]);
    }

    #[test]
    fn test_adopt_free_class() {
        let p = Package::new("pkg_adopt", "http://pkg.adopt/1.0", "pa");
        let c = Class::new("Loose", &[], false).unwrap();
        assert_eq!(c.package(), None);
        p.add(c).expect("adopt");
        assert_eq!(c.package(), Some(p));
        let other = Package::new("pkg_other", "http://pkg.other/1.0", "po");
        assert!(matches!(other.add(c), Err(SchemaError::AlreadyOwned { .. })));
    }

    #[test]
    fn test_dependencies_follow_references() {
        let base = Package::new("dep_base", "http://dep.base/1.0", "db");
        let target = base.define_class("T", &[], false).expect("T");
        let user = Package::new("dep_user", "http://dep.user/1.0", "du");
        let holder = user.define_class("H", &[], false).expect("H");
        holder
            .add_reference("t", target, crate::meta::Multiplicity::OPTIONAL, false)
            .expect("ref");
        assert_eq!(user.dependencies(), vec![base]);
    }
}
