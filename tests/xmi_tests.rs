//! XMI persistence: type tags, namespaces, Ecore documents and on-disk round trips.

mod common;

use common::{data, isolated_set, simple_mm, tree_package};
use metaforge::interchange::{InterchangeError, SaveOptions};
use metaforge::meta::{DataType, Multiplicity, Package, ecore};
use metaforge::resource::{MemoryStore, ResourceSet, isolated_registry};
use rstest::rstest;

fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

#[test]
fn test_create_save_and_read_back() {
    let mm = simple_mm();
    let dir = tempfile::tempdir().unwrap();
    let uri = path_in(&dir, "simple.xmi");

    let mut rs = isolated_set();
    rs.register_package(mm.package);
    let id = rs.create_resource(uri.as_str()).unwrap();
    let root = rs.create(mm.root).unwrap();
    let a = rs.create(mm.a).unwrap();
    let sub_a = rs.create(mm.sub_a).unwrap();
    rs.graph_mut().add(root, "a_container", a).unwrap();
    rs.graph_mut().add(root, "a_container", sub_a).unwrap();
    rs.append(id, root).unwrap();
    rs.save(id, &SaveOptions::default()).unwrap();

    let mut fresh = isolated_set();
    fresh.register_package(mm.package);
    let loaded = fresh.get_resource(uri.as_str()).unwrap();
    let root = fresh.contents(loaded)[0];
    let items = fresh.graph().get_objects(root, "a_container").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(fresh.graph().class_of(items[0]), Some(mm.a));
    assert_eq!(fresh.graph().class_of(items[1]), Some(mm.sub_a));
    assert!(fresh.graph().is_instance(items[1], mm.abs_a));
}

#[test]
fn test_save_modify_save_read() {
    let mm = simple_mm();
    let dir = tempfile::tempdir().unwrap();
    let uri = path_in(&dir, "modified.xmi");

    let mut rs = isolated_set();
    rs.register_package(mm.package);
    let id = rs.create_resource(uri.as_str()).unwrap();
    let root = rs.create(mm.root).unwrap();
    for class in [mm.a, mm.sub_a] {
        let item = rs.create(class).unwrap();
        rs.graph_mut().add(root, "a_container", item).unwrap();
    }
    rs.append(id, root).unwrap();
    rs.save(id, &SaveOptions::default()).unwrap();

    let extra = rs.create(mm.a).unwrap();
    rs.graph_mut().set(extra, "name", "third").unwrap();
    rs.graph_mut().add(root, "a_container", extra).unwrap();
    rs.save(id, &SaveOptions::default()).unwrap();

    let mut fresh = isolated_set();
    fresh.register_package(mm.package);
    let loaded = fresh.get_resource(uri.as_str()).unwrap();
    let root = fresh.contents(loaded)[0];
    let items = fresh.graph().get_objects(root, "a_container").unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(fresh.graph().get_str(items[2], "name").unwrap().as_deref(), Some("third"));
}

#[rstest]
#[case(true)]
#[case(false)]
fn test_type_tag_option(#[case] explicit: bool) {
    let mm = simple_mm();
    let mut rs = ResourceSet::new()
        .with_registry(isolated_registry())
        .with_store(MemoryStore::new());
    rs.register_package(mm.package);
    let id = rs.create_resource("tags.xmi").unwrap();
    let root = rs.create(mm.root).unwrap();
    let a = rs.create(mm.a).unwrap();
    rs.graph_mut().add(root, "a_container", a).unwrap();
    rs.append(id, root).unwrap();

    let options = SaveOptions::new().with_explicit_type_tag(explicit);
    let text = String::from_utf8(rs.save_bytes(id, &options).unwrap()).unwrap();
    assert_eq!(text.contains("xmi:type=\"simplemm:A\""), explicit);
    // A differs from the declared AbsA, so the implicit form still tags it.
    assert_eq!(text.contains("xsi:type=\"simplemm:A\""), !explicit);
}

#[test]
fn test_no_type_tag_when_class_matches() {
    let (package, a) = tree_package();
    let mut rs = ResourceSet::new()
        .with_registry(isolated_registry())
        .with_store(MemoryStore::new());
    rs.register_package(package);
    let id = rs.create_resource("tree.xmi").unwrap();
    let root = rs.create(a).unwrap();
    let child = rs.create(a).unwrap();
    rs.graph_mut().add(root, "children", child).unwrap();
    rs.graph_mut().add(root, "values", 7).unwrap();
    rs.append(id, root).unwrap();

    let text = String::from_utf8(rs.save_bytes(id, &SaveOptions::default()).unwrap()).unwrap();
    assert!(!text.contains("xsi:type"));
    assert!(!text.contains("parent="));
    assert!(text.contains("<values>7</values>"));

    let explicit = rs
        .save_bytes(id, &SaveOptions::new().with_explicit_type_tag(true))
        .unwrap();
    assert!(String::from_utf8(explicit).unwrap().contains("xmi:type=\"pack:A\""));
}

#[test]
fn test_load_ecore_then_instance() {
    let mut rs = isolated_set();
    let mm = rs.get_resource(data("xmi/My.ecore")).unwrap();
    let package = rs.register_resource_packages(mm).unwrap()[0];
    assert_eq!(&*package.ns_prefix(), "myprefix");
    let thing = package.class("Thing").unwrap();
    assert!(thing.feature("labels").unwrap().is_many());

    let id = rs.get_resource(data("xmi/MyRoot.xmi")).unwrap();
    let root = rs.contents(id)[0];
    let g = rs.graph();
    assert_eq!(g.get_str(root, "name").unwrap().as_deref(), Some("root"));
    let things = g.get_objects(root, "things").unwrap();
    assert_eq!(things.len(), 2);
    assert_eq!(g.get_int(things[1], "value").unwrap(), Some(2));
    let labels: Vec<String> = g
        .get_many(things[0], "labels")
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    assert_eq!(labels, vec!["first", "one"]);
}

#[test]
fn test_heterogeneous_namespaces() {
    let mypack = Package::new("mypack", "http://mypack/1.0", "mypack_pref");
    let holder = mypack.define_class("Root", &[], false).unwrap();
    holder
        .add_reference("element", ecore::ecore().e_object, Multiplicity::OPTIONAL, false)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let uri = path_in(&dir, "hetero.xmi");
    let mut rs = isolated_set();
    rs.register_package(mypack);
    let mm = rs.get_resource(data("xmi/My.ecore")).unwrap();
    rs.register_resource_packages(mm).unwrap();
    let other = rs.get_resource(data("xmi/MyRoot.xmi")).unwrap();
    let target = rs.contents(other)[0];

    let id = rs.create_resource(uri.as_str()).unwrap();
    let root = rs.create(holder).unwrap();
    rs.graph_mut().set(root, "element", target).unwrap();
    rs.append(id, root).unwrap();
    rs.save(id, &SaveOptions::default()).unwrap();

    let text = std::fs::read_to_string(&uri).unwrap();
    assert!(text.contains("xmlns:mypack_pref=\"http://mypack/1.0\""));
    assert!(text.contains("xmlns:myprefix=\"http://my/1.0\""));
    assert!(text.contains("xsi:type=\"myprefix:MyRoot\""));

    let mut fresh = isolated_set();
    fresh.register_package(mypack);
    let mm = fresh.get_resource(data("xmi/My.ecore")).unwrap();
    fresh.register_resource_packages(mm).unwrap();
    let loaded = fresh.get_resource(uri.as_str()).unwrap();
    let root = fresh.contents(loaded)[0];
    let element = fresh.graph().get_object(root, "element").unwrap().unwrap();
    assert!(fresh.graph().is_proxy(element));
    let resolved = fresh.resolve(element);
    assert_eq!(fresh.graph().get_str(resolved, "name").unwrap().as_deref(), Some("root"));
}

#[test]
fn test_ecore_save_and_load() {
    let package = Package::new("test", "http://test/ecore/1.0", "test");
    let a = package.define_class("A", &[], false).unwrap();
    a.add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
        .unwrap();
    a.add_attribute("age", DataType::Int, Multiplicity::OPTIONAL)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let uri = path_in(&dir, "test.ecore");
    let mut rs = isolated_set();
    let id = rs.resource_from_package(uri.as_str(), package).unwrap();
    rs.save(id, &SaveOptions::default()).unwrap();
    let text = std::fs::read_to_string(&uri).unwrap();
    assert!(text.contains("<ecore:EPackage"));
    assert!(text.contains("nsURI=\"http://test/ecore/1.0\""));

    let mut fresh = isolated_set();
    let loaded = fresh.get_resource(uri.as_str()).unwrap();
    let copy = fresh.package_from_resource(loaded).unwrap()[0];
    assert_eq!(&*copy.name(), "test");
    let a = copy.class("A").unwrap();
    assert_eq!(a.feature("name").unwrap().value_type(), Some(DataType::String.into()));
    assert_eq!(a.feature("age").unwrap().value_type(), Some(DataType::Int.into()));
}

#[test]
fn test_uuid_identifiers_survive_round_trip() {
    let (package, a) = tree_package();
    let dir = tempfile::tempdir().unwrap();
    let uri = path_in(&dir, "ids.xmi");
    let mut rs = isolated_set();
    rs.register_package(package);
    let id = rs.create_resource(uri.as_str()).unwrap();
    let root = rs.create(a).unwrap();
    let child = rs.create(a).unwrap();
    rs.graph_mut().add(root, "children", child).unwrap();
    rs.append(id, root).unwrap();
    rs.save(id, &SaveOptions::new().with_uuid(true)).unwrap();
    let child_id = rs.resource(id).unwrap().id_of(child).unwrap().to_string();
    assert!(child_id.starts_with('_'));

    let mut fresh = isolated_set();
    fresh.register_package(package);
    let loaded = fresh.get_resource(uri.as_str()).unwrap();
    let copy = fresh.object_at(loaded, &child_id).unwrap();
    let root = fresh.contents(loaded)[0];
    assert_eq!(fresh.graph().container(copy), Some(root));
}

#[test]
fn test_unknown_type_tag_leaves_no_partial_root() {
    let mm = simple_mm();
    let mut rs = ResourceSet::new()
        .with_registry(isolated_registry())
        .with_store(MemoryStore::new().with_document(
            "bad.xmi",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<simplemm:MyRoot xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:simplemm="http://simplemetamodel/1.0">
  <a_container xsi:type="simplemm:Missing"/>
</simplemm:MyRoot>
"#,
        ));
    rs.register_package(mm.package);
    let err = rs.get_resource("bad.xmi").unwrap_err();
    assert!(matches!(
        err.load_source(),
        Some(InterchangeError::UnknownClass { .. })
    ));
    assert!(rs.resource_by_uri("bad.xmi").is_none());
    assert_eq!(rs.resources().count(), 0);
}

#[test]
fn test_abstract_declared_type_without_tag_fails() {
    let mm = simple_mm();
    let mut rs = ResourceSet::new()
        .with_registry(isolated_registry())
        .with_store(MemoryStore::new().with_document(
            "abstract.xmi",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<simplemm:MyRoot xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI"
    xmlns:simplemm="http://simplemetamodel/1.0">
  <a_container/>
</simplemm:MyRoot>
"#,
        ));
    rs.register_package(mm.package);
    let err = rs.get_resource("abstract.xmi").unwrap_err();
    assert!(matches!(err.load_source(), Some(InterchangeError::Model(_))));
}
