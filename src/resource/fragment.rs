//! URI fragments addressing objects inside a resource.
//!
//! ```text
//! /               the only (or first) root
//! /2              the third root of a multi-root document
//! //@items.1/@x   containment path: feature name, index for many-valued
//! //Shape/name    named Ecore elements use their names as segments
//! _k3…            identifiers: recorded ids, then ID attribute values
//! ```

use super::Resource;
use crate::graph::{ObjectGraph, ObjectId, Value};
use crate::meta::ecore;

/// Fragment addressing `object` within `resource`: its identifier if it has
/// one, otherwise its containment path.
pub(crate) fn fragment_of(graph: &ObjectGraph, resource: &Resource, object: ObjectId) -> Option<String> {
    let object = graph.follow(object);
    if let Some(id) = resource.id_of(object) {
        return Some(id.to_string());
    }
    path_of(graph, resource.contents(), object)
}

/// Containment path of `object` below one of `roots`.
pub(crate) fn path_of(graph: &ObjectGraph, roots: &[ObjectId], object: ObjectId) -> Option<String> {
    let root = graph.root(object);
    let index = roots.iter().position(|r| graph.follow(*r) == root)?;
    let mut segments = Vec::new();
    let mut current = object;
    while let Some(parent) = graph.container(current) {
        segments.push(segment(graph, parent, current)?);
        current = parent;
    }
    segments.reverse();

    let mut out = String::from("/");
    if roots.len() > 1 {
        out.push_str(&index.to_string());
    }
    for seg in segments {
        out.push('/');
        out.push_str(&seg);
    }
    Some(out)
}

fn segment(graph: &ObjectGraph, parent: ObjectId, child: ObjectId) -> Option<String> {
    if let Some(name) = unique_name(graph, parent, child) {
        return Some(name);
    }
    let feature = graph.containing_feature(child)?;
    if !feature.is_many() {
        return Some(format!("@{}", feature.name()));
    }
    let index = graph
        .get_objects(parent, feature)
        .ok()?
        .iter()
        .position(|c| *c == child)?;
    Some(format!("@{}.{index}", feature.name()))
}

/// Name of an Ecore named element, when no sibling shares it.
fn unique_name(graph: &ObjectGraph, parent: ObjectId, child: ObjectId) -> Option<String> {
    let e = ecore::ecore();
    let name_of = |id: ObjectId| -> Option<String> {
        if !graph.is_instance(id, e.e_named_element) {
            return None;
        }
        graph.get_str(id, e.name).ok().flatten().map(|s| s.to_string())
    };
    let name = name_of(child).filter(|n| !n.is_empty() && !n.starts_with('@'))?;
    let clashes = graph
        .contents(parent)
        .into_iter()
        .filter(|sibling| name_of(*sibling).as_deref() == Some(name.as_str()))
        .count();
    (clashes == 1).then_some(name)
}

/// Find the object a fragment designates.
pub(crate) fn resolve(graph: &ObjectGraph, resource: &Resource, fragment: &str) -> Option<ObjectId> {
    let roots = resource.contents();
    let Some(path) = fragment.strip_prefix('/') else {
        return resolve_id(graph, resource, fragment);
    };
    let mut parts = path.split('/');
    let root_segment = parts.next().unwrap_or_default();
    let root = if root_segment.is_empty() {
        *roots.first()?
    } else {
        *roots.get(root_segment.parse::<usize>().ok()?)?
    };
    let mut current = graph.follow(root);
    for seg in parts {
        if seg.is_empty() {
            continue;
        }
        current = step(graph, current, seg)?;
    }
    Some(current)
}

fn step(graph: &ObjectGraph, current: ObjectId, segment: &str) -> Option<ObjectId> {
    let Some(feature_path) = segment.strip_prefix('@') else {
        return child_named(graph, current, segment);
    };
    let (name, index) = match feature_path.rsplit_once('.') {
        Some((name, index)) if index.bytes().all(|b| b.is_ascii_digit()) => {
            (name, index.parse::<usize>().ok()?)
        }
        _ => (feature_path, 0),
    };
    let values = graph.get_objects(current, name).ok()?;
    values.get(index).map(|id| graph.follow(*id))
}

fn child_named(graph: &ObjectGraph, current: ObjectId, name: &str) -> Option<ObjectId> {
    let e = ecore::ecore();
    graph.contents(current).into_iter().find(|child| {
        graph.is_instance(*child, e.e_named_element)
            && graph.get_str(*child, e.name).ok().flatten().as_deref() == Some(name)
    })
}

fn resolve_id(graph: &ObjectGraph, resource: &Resource, id: &str) -> Option<ObjectId> {
    if let Some(object) = resource.object_by_id(id) {
        return Some(graph.follow(object));
    }
    let wanted = Value::String(id.into());
    resource.contents().iter().find_map(|root| {
        std::iter::once(graph.follow(*root))
            .chain(graph.all_contents(*root))
            .find(|candidate| {
                graph
                    .class_of(*candidate)
                    .and_then(|c| c.id_attribute())
                    .and_then(|attr| graph.get_value(*candidate, attr).ok().flatten())
                    .is_some_and(|v| v == wanted || v.to_text().as_deref() == Some(id))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interchange::Xmi;
    use crate::meta::{Class, DataType, Feature, Multiplicity, Package};
    use std::sync::Arc;

    struct Schema {
        node: Class,
        kids: Feature,
        key: Feature,
        single: Feature,
    }

    fn schema(tag: &str) -> Schema {
        let p = Package::new(tag, &format!("http://fragment.test/{tag}"), tag);
        let node = p.define_class("Node", &[], false).unwrap();
        let key = node
            .add_attribute("key", DataType::String, Multiplicity::OPTIONAL)
            .unwrap();
        key.set_id(true).unwrap();
        let kids = node
            .add_reference("kids", node, Multiplicity::MANY, true)
            .unwrap();
        let single = node
            .add_reference("single", node, Multiplicity::OPTIONAL, true)
            .unwrap();
        Schema {
            node,
            kids,
            key,
            single,
        }
    }

    fn resource(roots: &[ObjectId]) -> Resource {
        let mut r = Resource::new("frag.xmi".into(), Arc::new(Xmi));
        r.roots = roots.to_vec();
        r
    }

    #[test]
    fn test_paths_resolve_back() {
        let s = schema("paths");
        let mut g = ObjectGraph::new();
        let root = g.create(s.node).unwrap();
        let a = g.create(s.node).unwrap();
        let b = g.create(s.node).unwrap();
        let c = g.create(s.node).unwrap();
        g.add(root, s.kids, a).unwrap();
        g.add(root, s.kids, b).unwrap();
        g.set(b, s.single, c).unwrap();
        let r = resource(&[root]);

        assert_eq!(fragment_of(&g, &r, root).as_deref(), Some("/"));
        assert_eq!(fragment_of(&g, &r, b).as_deref(), Some("//@kids.1"));
        assert_eq!(fragment_of(&g, &r, c).as_deref(), Some("//@kids.1/@single"));
        for id in [root, a, b, c] {
            let frag = fragment_of(&g, &r, id).unwrap();
            assert_eq!(resolve(&g, &r, &frag), Some(id), "fragment {frag}");
        }
        assert_eq!(resolve(&g, &r, "//@kids.9"), None);
    }

    #[test]
    fn test_multiple_roots_are_numbered() {
        let s = schema("multi_roots");
        let mut g = ObjectGraph::new();
        let r1 = g.create(s.node).unwrap();
        let r2 = g.create(s.node).unwrap();
        let child = g.create(s.node).unwrap();
        g.add(r2, s.kids, child).unwrap();
        let r = resource(&[r1, r2]);
        assert_eq!(fragment_of(&g, &r, r1).as_deref(), Some("/0"));
        assert_eq!(fragment_of(&g, &r, child).as_deref(), Some("/1/@kids.0"));
        assert_eq!(resolve(&g, &r, "/1/@kids.0"), Some(child));
        assert_eq!(resolve(&g, &r, "/"), Some(r1));
    }

    #[test]
    fn test_ids_take_precedence() {
        let s = schema("ids");
        let mut g = ObjectGraph::new();
        let root = g.create(s.node).unwrap();
        let child = g.create(s.node).unwrap();
        g.add(root, s.kids, child).unwrap();
        g.set(child, s.key, "the-key").unwrap();
        let mut r = resource(&[root]);
        assert_eq!(resolve(&g, &r, "the-key"), Some(child));

        r.set_id(child, "_abc");
        assert_eq!(fragment_of(&g, &r, child).as_deref(), Some("_abc"));
        assert_eq!(resolve(&g, &r, "_abc"), Some(child));
    }

    #[test]
    fn test_named_ecore_segments() {
        let e = ecore::ecore();
        let mut g = ObjectGraph::new();
        let pkg = g.create(e.e_package).unwrap();
        let class_b = g.create(e.e_class).unwrap();
        g.set(class_b, e.name, "B").unwrap();
        g.add(pkg, e.e_classifiers, class_b).unwrap();
        let attr = g.create(e.e_attribute).unwrap();
        g.set(attr, e.name, "size").unwrap();
        g.add(class_b, e.e_structural_features, attr).unwrap();
        let r = resource(&[pkg]);
        assert_eq!(fragment_of(&g, &r, attr).as_deref(), Some("//B/size"));
        assert_eq!(resolve(&g, &r, "//B"), Some(class_b));
        assert_eq!(resolve(&g, &r, "//@eClassifiers.0"), Some(class_b));
    }
}
