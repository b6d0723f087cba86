//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use metaforge::meta::{Class, DataType, Multiplicity, Package};
use metaforge::resource::{ResourceSet, isolated_registry};

/// Absolute path of a document under `tests/data`.
pub fn data(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// A resource set backed by the filesystem with its own package registry.
pub fn isolated_set() -> ResourceSet {
    ResourceSet::new().with_registry(isolated_registry())
}

/// `pack` (`http://test/1.0`): `A(name, children: A* containment, parent, values: int*)`.
pub fn tree_package() -> (Package, Class) {
    let package = Package::new("pack", "http://test/1.0", "pack");
    let a = package.define_class("A", &[], false).unwrap();
    a.add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
        .unwrap();
    let children = a.add_reference("children", a, Multiplicity::MANY, true).unwrap();
    let parent = a.add_reference("parent", a, Multiplicity::OPTIONAL, false).unwrap();
    children.set_opposite(parent).unwrap();
    a.add_attribute("values", DataType::Int, Multiplicity::MANY)
        .unwrap();
    (package, a)
}

/// Classes of the `simplemm` metamodel.
pub struct SimpleMm {
    pub package: Package,
    pub abs_a: Class,
    pub a: Class,
    pub sub_a: Class,
    pub root: Class,
}

/// `simplemm` (`http://simplemetamodel/1.0`): abstract `AbsA`, `A: AbsA`,
/// `SubA: A` and `MyRoot(a_container: AbsA* containment)`.
pub fn simple_mm() -> SimpleMm {
    let package = Package::new("simplemm", "http://simplemetamodel/1.0", "simplemm");
    let abs_a = package.define_class("AbsA", &[], true).unwrap();
    let a = package.define_class("A", &[abs_a], false).unwrap();
    let sub_a = package.define_class("SubA", &[a], false).unwrap();
    let root = package.define_class("MyRoot", &[], false).unwrap();
    root.add_reference("a_container", abs_a, Multiplicity::MANY, true)
        .unwrap();
    a.add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
        .unwrap();
    SimpleMm {
        package,
        abs_a,
        a,
        sub_a,
        root,
    }
}
