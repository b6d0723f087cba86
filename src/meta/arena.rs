//! Process-wide storage for schema records.
//!
//! Every package, class, enumeration and feature lives in one append-only
//! arena guarded by a `parking_lot::RwLock`. Handles are plain indices, so
//! they are `Copy`, `Send` and never dangle. Records are never freed: schema
//! definitions live for the whole process, like generated types would.
//!
//! Handle methods go through [`read`] / [`write`]. Neither may be called
//! while the other is active on the same thread, so arena logic is written as
//! `&self` / `&mut self` methods on [`MetaArena`] that only touch records.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use super::ecore::{self, Ecore};
use super::{
    Class, Classifier, EnumLiteral, Enumeration, Feature, Multiplicity, Package, SchemaError,
    ValueType,
};
use crate::base::{Interner, Name};

static ARENA: Lazy<RwLock<MetaArena>> = Lazy::new(|| RwLock::new(MetaArena::bootstrap()));

/// Run `f` with shared access to the arena.
pub(crate) fn read<R>(f: impl FnOnce(&MetaArena) -> R) -> R {
    f(&ARENA.read())
}

/// Run `f` with exclusive access to the arena.
pub(crate) fn write<R>(f: impl FnOnce(&mut MetaArena) -> R) -> R {
    f(&mut ARENA.write())
}

/// Best-effort read used by `Debug` impls, which may run while the arena is
/// locked for writing.
pub(crate) fn try_read<R>(f: impl FnOnce(&MetaArena) -> R) -> Option<R> {
    ARENA.try_read().map(|guard| f(&guard))
}

#[derive(Debug)]
pub(crate) struct PackageData {
    pub name: Name,
    pub ns_uri: Name,
    pub ns_prefix: Name,
    pub classifiers: Vec<Classifier>,
    pub subpackages: Vec<Package>,
    pub super_package: Option<Package>,
}

#[derive(Debug)]
pub(crate) struct ClassData {
    pub name: Name,
    pub package: Option<Package>,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub supertypes: Vec<Class>,
    pub features: Vec<Feature>,
}

#[derive(Debug)]
pub(crate) struct LiteralData {
    pub name: Name,
    pub value: i64,
}

#[derive(Debug)]
pub(crate) struct EnumData {
    pub name: Name,
    pub package: Option<Package>,
    pub literals: Vec<LiteralData>,
}

#[derive(Debug, Clone)]
pub(crate) enum FeatureKind {
    Attribute {
        ty: ValueType,
        id: bool,
        default: Option<Name>,
    },
    Reference {
        target: Class,
        containment: bool,
        opposite: Option<Feature>,
    },
}

#[derive(Debug)]
pub(crate) struct FeatureData {
    pub name: Name,
    pub class: Class,
    pub multiplicity: Multiplicity,
    pub unique: bool,
    pub transient: bool,
    pub kind: FeatureKind,
}

/// All schema records of the process.
#[derive(Debug)]
pub(crate) struct MetaArena {
    names: Interner,
    pub packages: Vec<PackageData>,
    pub classes: Vec<ClassData>,
    pub enums: Vec<EnumData>,
    pub features: Vec<FeatureData>,
    ecore: Ecore,
}

impl MetaArena {
    fn bootstrap() -> Self {
        let mut arena = Self {
            names: Interner::new(),
            packages: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
            features: Vec::new(),
            ecore: Ecore::default(),
        };
        arena.ecore = ecore::build(&mut arena);
        arena
    }

    pub fn ecore(&self) -> Ecore {
        self.ecore
    }

    pub fn intern(&mut self, s: &str) -> Name {
        self.names.intern(s)
    }

    // ── Record access ───────────────────────────────────────────────

    pub fn package(&self, p: Package) -> &PackageData {
        &self.packages[p.0 as usize]
    }

    pub fn class(&self, c: Class) -> &ClassData {
        &self.classes[c.0 as usize]
    }

    pub fn enumeration(&self, e: Enumeration) -> &EnumData {
        &self.enums[e.0 as usize]
    }

    pub fn feature(&self, f: Feature) -> &FeatureData {
        &self.features[f.0 as usize]
    }

    pub fn literal(&self, l: EnumLiteral) -> &LiteralData {
        &self.enumeration(l.enumeration).literals[l.index as usize]
    }

    // ── Unchecked construction (bootstrap and checked wrappers) ─────

    pub fn push_package(&mut self, name: &str, ns_uri: &str, ns_prefix: &str) -> Package {
        let data = PackageData {
            name: self.intern(name),
            ns_uri: self.intern(ns_uri),
            ns_prefix: self.intern(ns_prefix),
            classifiers: Vec::new(),
            subpackages: Vec::new(),
            super_package: None,
        };
        self.packages.push(data);
        Package((self.packages.len() - 1) as u32)
    }

    pub fn push_class(
        &mut self,
        package: Option<Package>,
        name: &str,
        supertypes: &[Class],
        is_abstract: bool,
    ) -> Class {
        let data = ClassData {
            name: self.intern(name),
            package,
            is_abstract,
            is_interface: false,
            supertypes: supertypes.to_vec(),
            features: Vec::new(),
        };
        self.classes.push(data);
        let class = Class((self.classes.len() - 1) as u32);
        if let Some(p) = package {
            self.packages[p.0 as usize]
                .classifiers
                .push(Classifier::Class(class));
        }
        class
    }

    pub fn push_enum(&mut self, package: Option<Package>, name: &str, literals: &[&str]) -> Enumeration {
        let literals = literals
            .iter()
            .enumerate()
            .map(|(i, l)| LiteralData {
                name: self.intern(l),
                value: i as i64,
            })
            .collect();
        let data = EnumData {
            name: self.intern(name),
            package,
            literals,
        };
        self.enums.push(data);
        let e = Enumeration((self.enums.len() - 1) as u32);
        if let Some(p) = package {
            self.packages[p.0 as usize]
                .classifiers
                .push(Classifier::Enum(e));
        }
        e
    }

    pub fn push_feature(
        &mut self,
        class: Class,
        name: &str,
        multiplicity: Multiplicity,
        kind: FeatureKind,
    ) -> Feature {
        let unique = matches!(kind, FeatureKind::Reference { .. });
        let data = FeatureData {
            name: self.intern(name),
            class,
            multiplicity,
            unique,
            transient: false,
            kind,
        };
        self.features.push(data);
        let f = Feature((self.features.len() - 1) as u32);
        self.classes[class.0 as usize].features.push(f);
        f
    }

    /// Pair two references as opposites, unlinking previous partners.
    pub fn link_opposites(&mut self, a: Feature, b: Feature) {
        for (this, other) in [(a, b), (b, a)] {
            let previous = match &self.features[this.0 as usize].kind {
                FeatureKind::Reference { opposite, .. } => *opposite,
                FeatureKind::Attribute { .. } => None,
            };
            if let Some(prev) = previous.filter(|p| *p != other) {
                if let FeatureKind::Reference { opposite, .. } =
                    &mut self.features[prev.0 as usize].kind
                {
                    *opposite = None;
                }
            }
            if let FeatureKind::Reference { opposite, .. } = &mut self.features[this.0 as usize].kind {
                *opposite = Some(other);
            }
        }
    }

    // ── Derived class queries ───────────────────────────────────────

    /// All ancestors, nearest-first per supertype, without duplicates.
    pub fn all_supertypes(&self, c: Class) -> Vec<Class> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_supertypes(c, &mut out, &mut seen);
        out
    }

    fn collect_supertypes(&self, c: Class, out: &mut Vec<Class>, seen: &mut FxHashSet<Class>) {
        for &s in &self.class(c).supertypes {
            if seen.insert(s) {
                self.collect_supertypes(s, out, seen);
                out.push(s);
            }
        }
    }

    /// Inherited features in supertype order, then own features.
    pub fn all_features(&self, c: Class) -> Vec<Feature> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        for s in self.all_supertypes(c) {
            for &f in &self.class(s).features {
                if seen.insert(f) {
                    out.push(f);
                }
            }
        }
        out.extend(self.class(c).features.iter().copied());
        out
    }

    pub fn find_feature(&self, c: Class, name: &str) -> Option<Feature> {
        self.all_features(c)
            .into_iter()
            .find(|f| &*self.feature(*f).name == name)
    }

    pub fn conforms(&self, c: Class, target: Class) -> bool {
        if c == target || target == self.ecore().e_object {
            return true;
        }
        self.class(c)
            .supertypes
            .iter()
            .any(|s| self.conforms(*s, target))
    }

    /// `c` and every class that specializes it.
    fn with_subclasses(&self, c: Class) -> Vec<Class> {
        (0..self.classes.len() as u32)
            .map(Class)
            .filter(|x| *x == c || self.conforms_strict(*x, c))
            .collect()
    }

    fn conforms_strict(&self, c: Class, target: Class) -> bool {
        c == target
            || self
                .class(c)
                .supertypes
                .iter()
                .any(|s| self.conforms_strict(*s, target))
    }

    // ── Checked mutation ────────────────────────────────────────────

    pub fn check_new_feature(&self, c: Class, name: &str) -> Result<(), SchemaError> {
        for x in self.with_subclasses(c) {
            if self
                .all_features(x)
                .iter()
                .any(|f| &*self.feature(*f).name == name)
            {
                return Err(SchemaError::Conflict {
                    class: self.class(x).name.clone(),
                    feature: name.into(),
                });
            }
        }
        Ok(())
    }

    /// Features inherited by a new class from `supertypes` must not share a
    /// name unless they are the same feature reached through two paths.
    pub fn check_supertypes(&self, name: &str, supertypes: &[Class]) -> Result<(), SchemaError> {
        let mut inherited: Vec<Feature> = Vec::new();
        for &s in supertypes {
            for f in self.all_features(s) {
                if inherited.contains(&f) {
                    continue;
                }
                let feature = &self.feature(f).name;
                if inherited.iter().any(|e| self.feature(*e).name == *feature) {
                    return Err(SchemaError::Conflict {
                        class: name.into(),
                        feature: feature.clone(),
                    });
                }
                inherited.push(f);
            }
        }
        Ok(())
    }

    pub fn add_supertype(&mut self, c: Class, s: Class) -> Result<(), SchemaError> {
        if self.class(c).supertypes.contains(&s) {
            return Ok(());
        }
        if self.conforms_strict(s, c) {
            return Err(SchemaError::CyclicInheritance {
                class: self.class(c).name.clone(),
                supertype: self.class(s).name.clone(),
            });
        }
        let incoming = self.all_features(s);
        for x in self.with_subclasses(c) {
            let existing = self.all_features(x);
            for f in &incoming {
                let name = &self.feature(*f).name;
                if existing
                    .iter()
                    .any(|e| e != f && self.feature(*e).name == *name)
                {
                    return Err(SchemaError::Conflict {
                        class: self.class(x).name.clone(),
                        feature: name.clone(),
                    });
                }
            }
        }
        self.classes[c.0 as usize].supertypes.push(s);
        Ok(())
    }

    pub fn check_new_classifier(&self, p: Package, name: &str) -> Result<(), SchemaError> {
        let taken = self
            .package(p)
            .classifiers
            .iter()
            .any(|c| &*self.classifier_name(*c) == name);
        if taken {
            return Err(SchemaError::DuplicateClassifier {
                package: self.package(p).name.clone(),
                name: name.into(),
            });
        }
        Ok(())
    }

    pub fn classifier_name(&self, c: Classifier) -> Name {
        match c {
            Classifier::Class(c) => self.class(c).name.clone(),
            Classifier::Enum(e) => self.enumeration(e).name.clone(),
        }
    }

    pub fn classifier_package(&self, c: Classifier) -> Option<Package> {
        match c {
            Classifier::Class(c) => self.class(c).package,
            Classifier::Enum(e) => self.enumeration(e).package,
        }
    }

    /// Record the owning package of a free-standing classifier.
    pub fn adopt(&mut self, p: Package, c: Classifier) -> Result<(), SchemaError> {
        if let Some(owner) = self.classifier_package(c) {
            if owner == p {
                return Ok(());
            }
            return Err(SchemaError::AlreadyOwned {
                classifier: self.classifier_name(c),
                package: self.package(owner).name.clone(),
            });
        }
        let name = self.classifier_name(c);
        self.check_new_classifier(p, &name)?;
        match c {
            Classifier::Class(class) => self.classes[class.0 as usize].package = Some(p),
            Classifier::Enum(e) => self.enums[e.0 as usize].package = Some(p),
        }
        self.packages[p.0 as usize].classifiers.push(c);
        Ok(())
    }
}
