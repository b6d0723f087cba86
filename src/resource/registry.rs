//! Package registries.
//!
//! Two registries are consulted when a document names a namespace: the one
//! owned by the resource set, then a shared one. By default the shared one is
//! the process-wide [`global_registry`], which starts empty and only changes
//! through explicit registration.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::base::Name;
use crate::meta::Package;

/// Maps namespace URIs to packages.
#[derive(Debug, Default, Clone)]
pub struct PackageRegistry {
    packages: IndexMap<Name, Package>,
}

/// A registry that several resource sets can share.
pub type SharedRegistry = Arc<RwLock<PackageRegistry>>;

static GLOBAL: Lazy<SharedRegistry> = Lazy::new(SharedRegistry::default);

/// The process-wide registry.
pub fn global_registry() -> SharedRegistry {
    Arc::clone(&GLOBAL)
}

/// A fresh, empty registry for use in place of the global one.
pub fn isolated_registry() -> SharedRegistry {
    SharedRegistry::default()
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `package` and its subpackages under their nsURIs.
    /// Returns the package previously registered under the root's nsURI.
    pub fn register(&mut self, package: Package) -> Option<Package> {
        let previous = self.packages.insert(package.ns_uri(), package);
        for sub in package.all_packages().into_iter().skip(1) {
            self.packages.entry(sub.ns_uri()).or_insert(sub);
        }
        tracing::debug!(ns_uri = %package.ns_uri(), "registered package");
        previous
    }

    pub fn get(&self, ns_uri: &str) -> Option<Package> {
        self.packages.get(ns_uri).copied()
    }

    pub fn contains(&self, ns_uri: &str) -> bool {
        self.packages.contains_key(ns_uri)
    }

    pub fn remove(&mut self, ns_uri: &str) -> Option<Package> {
        self.packages.shift_remove(ns_uri)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Registered packages in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Package)> + '_ {
        self.packages.iter().map(|(uri, p)| (&**uri, *p))
    }
}

/// What happens to `EPackage` roots found in loaded documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageRegistration {
    /// Nothing is registered implicitly.
    #[default]
    Explicit,
    /// Convert and register in the resource set's own registry.
    Local,
    /// Convert and register in the shared registry.
    Global,
}

/// Resource set configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSetOptions {
    pub registration: PackageRegistration,
}

impl ResourceSetOptions {
    pub fn with_registration(mut self, registration: PackageRegistration) -> Self {
        self.registration = registration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PackageRegistry::new();
        let p = Package::new("reg", "http://registry.test/1.0", "reg");
        assert_eq!(registry.register(p), None);
        assert_eq!(registry.get("http://registry.test/1.0"), Some(p));
        assert!(registry.contains("http://registry.test/1.0"));
        assert_eq!(registry.remove("http://registry.test/1.0"), Some(p));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_includes_subpackages() {
        let mut registry = PackageRegistry::new();
        let outer = Package::new("outer_reg", "http://registry.test/outer", "o");
        let inner = Package::new("inner_reg", "http://registry.test/inner", "i");
        outer.add_subpackage(inner).expect("nest");
        registry.register(outer);
        assert_eq!(registry.get("http://registry.test/inner"), Some(inner));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_isolated_registries_do_not_share() {
        let a = isolated_registry();
        let b = isolated_registry();
        a.write()
            .register(Package::new("iso", "http://registry.test/iso", "iso"));
        assert!(b.read().is_empty());
        assert_eq!(a.read().len(), 1);
    }
}
