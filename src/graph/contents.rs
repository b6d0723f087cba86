//! Containment-tree traversal.

use super::{ObjectGraph, ObjectId, Value};

/// Pre-order iterator over everything contained under a root, the root
/// excluded. Created by [`ObjectGraph::all_contents`].
pub struct AllContents<'g> {
    graph: &'g ObjectGraph,
    stack: Vec<ObjectId>,
}

impl Iterator for AllContents<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        let next = self.stack.pop()?;
        let children = self.graph.contents(next);
        self.stack.extend(children.into_iter().rev());
        Some(next)
    }
}

impl ObjectGraph {
    /// Direct children over all containment references, in feature order.
    /// Unresolved proxies held by containment references are skipped.
    pub fn contents(&self, id: ObjectId) -> Vec<ObjectId> {
        let Ok(data) = self.data(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for feature in data.class.containments() {
            let Some(values) = data.values.get(&feature) else {
                continue;
            };
            out.extend(
                values
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|child| self.follow(child))
                    .filter(|child| !self.is_proxy(*child)),
            );
        }
        out
    }

    /// Every object transitively contained under `id`, depth first.
    pub fn all_contents(&self, id: ObjectId) -> AllContents<'_> {
        let mut stack = self.contents(id);
        stack.reverse();
        AllContents { graph: self, stack }
    }

    /// The top of the containment tree holding `id`.
    pub fn root(&self, id: ObjectId) -> ObjectId {
        let mut current = self.follow(id);
        while let Some(parent) = self.container(current) {
            current = parent;
        }
        current
    }

    /// Whether `ancestor` transitively contains `id`.
    pub fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let ancestor = self.follow(ancestor);
        let mut current = self.container(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.container(parent);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Uri;
    use crate::meta::{Class, DataType, Multiplicity, Package};

    fn folder_schema() -> (Class, crate::meta::Feature) {
        let p = Package::new("contents", "http://contents.test/1.0", "ct");
        let folder = p.define_class("Folder", &[], false).unwrap();
        folder
            .add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
            .unwrap();
        let items = folder
            .add_reference("items", folder, Multiplicity::MANY, true)
            .unwrap();
        (folder, items)
    }

    #[test]
    fn test_all_contents_is_preorder() {
        let (folder, items) = folder_schema();
        let mut g = ObjectGraph::new();
        let a1 = g.create(folder).unwrap();
        let a2 = g.create(folder).unwrap();
        let a3 = g.create(folder).unwrap();
        let a4 = g.create(folder).unwrap();
        g.add(a1, items, a2).unwrap();
        g.add(a1, items, a3).unwrap();
        g.add(a2, items, a4).unwrap();

        let order: Vec<_> = g.all_contents(a1).collect();
        assert_eq!(order, vec![a2, a4, a3]);
        assert_eq!(g.root(a4), a1);
        assert!(g.is_ancestor(a1, a4));
        assert!(!g.is_ancestor(a3, a4));
    }

    #[test]
    fn test_contents_skip_unresolved_proxies() {
        let (folder, items) = folder_schema();
        let mut g = ObjectGraph::new();
        let a = g.create(folder).unwrap();
        let p = g.create_proxy(Uri::new("other.xmi#/"), Some(folder));
        g.add(a, items, p).unwrap();
        assert!(g.contents(a).is_empty());

        let real = g.create(folder).unwrap();
        g.resolve_proxy(p, real).unwrap();
        assert_eq!(g.contents(a), vec![real]);
        assert!(!g.is_proxy(p));
        assert_eq!(g.follow(p), real);
    }
}
