//! Proxy creation and resolution.

use super::{ResourceId, ResourceSet, fragment};
use crate::base::Uri;
use crate::graph::{AsFeature, ObjectId, Value};
use crate::meta::Class;

impl ResourceSet {
    /// The proxy standing for `uri`. One URI always yields the same proxy.
    pub fn proxy_for(&mut self, uri: impl Into<Uri>, expected: Option<Class>) -> ObjectId {
        let uri: Uri = uri.into();
        if let Some(proxy) = self.proxies.get(&uri) {
            return *proxy;
        }
        let proxy = self.graph.create_proxy(uri.clone(), expected);
        tracing::trace!(%uri, %proxy, "created proxy");
        self.proxies.insert(uri, proxy);
        proxy
    }

    /// The object at `uri` if its document is already in the set.
    pub(crate) fn loaded_object(&self, uri: &Uri) -> Option<ObjectId> {
        let id = self.by_uri.get(&uri.document_uri())?;
        let resource = self.resource(*id)?;
        fragment::resolve(&self.graph, resource, uri.fragment().unwrap_or("/"))
    }

    /// Whether `id` designates a live object rather than a pending proxy.
    pub fn is_resolved(&self, id: ObjectId) -> bool {
        !self.graph.is_proxy(id)
    }

    /// Resolve `id` if it is a proxy, loading its document when needed.
    ///
    /// Returns the object `id` stands for. A missing document or fragment
    /// leaves the proxy in place and returns it unchanged.
    pub fn resolve(&mut self, id: ObjectId) -> ObjectId {
        let current = self.graph.follow(id);
        let Some(uri) = self.graph.proxy_uri(current).cloned() else {
            return current;
        };
        let document = uri.document_uri();
        if !self.by_uri.contains_key(&document) {
            if let Err(err) = self.get_resource(document) {
                tracing::debug!(%uri, error = %err, "proxy target document is unavailable");
                return current;
            }
        }
        // Loading the document may already have completed the proxy.
        if !self.graph.is_proxy(current) {
            return self.graph.follow(current);
        }
        let Some(target) = self.loaded_object(&uri) else {
            tracing::debug!(%uri, "proxy fragment does not resolve");
            return current;
        };
        match self.graph.resolve_proxy(current, target) {
            Ok(()) => self.graph.follow(current),
            Err(err) => {
                tracing::debug!(%uri, error = %err, "cannot resolve proxy");
                current
            }
        }
    }

    /// Resolve every target of a reference of `object`.
    pub fn resolve_reference(
        &mut self,
        object: ObjectId,
        feature: impl AsFeature,
    ) -> Result<Vec<ObjectId>, super::ResourceError> {
        let targets = self.graph.get_objects(object, feature)?;
        Ok(targets.into_iter().map(|t| self.resolve(t)).collect())
    }

    /// Resolve every proxy referenced from the objects of a resource.
    /// Returns the proxies that stay unresolved.
    pub fn resolve_all(&mut self, id: ResourceId) -> Vec<ObjectId> {
        let objects: Vec<ObjectId> = self
            .contents(id)
            .iter()
            .flat_map(|root| std::iter::once(*root).chain(self.graph.all_contents(*root)))
            .collect();
        let mut pending = Vec::new();
        for object in objects {
            let Ok(features) = self.graph.set_features(object) else {
                continue;
            };
            for feature in features.into_iter().filter(|f| f.is_reference()) {
                let Ok(values) = self.graph.raw_values(object, feature) else {
                    continue;
                };
                pending.extend(values.iter().filter_map(Value::as_object).filter(|t| self.graph.is_proxy(*t)));
            }
        }
        pending.dedup();
        let mut unresolved = Vec::new();
        for proxy in pending {
            let target = self.resolve(proxy);
            if self.graph.is_proxy(target) && !unresolved.contains(&target) {
                unresolved.push(target);
            }
        }
        tracing::debug!(resource = ?id, unresolved = unresolved.len(), "resolved references");
        unresolved
    }

    /// Resolve pending proxies into the document at `document`.
    /// Returns how many were completed.
    pub(crate) fn complete_proxies(&mut self, document: &Uri) -> usize {
        let document = document.document_uri();
        let candidates: Vec<(Uri, ObjectId)> = self
            .proxies
            .iter()
            .filter(|(uri, proxy)| uri.document_uri() == document && self.graph.is_proxy(**proxy))
            .map(|(uri, proxy)| (uri.clone(), *proxy))
            .collect();
        let mut completed = 0;
        for (uri, proxy) in candidates {
            let Some(target) = self.loaded_object(&uri) else {
                tracing::debug!(%uri, "proxy fragment does not resolve");
                continue;
            };
            if self.graph.resolve_proxy(proxy, target).is_ok() {
                completed += 1;
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Multiplicity, Package};
    use crate::resource::{MemoryStore, isolated_registry};

    #[test]
    fn test_proxy_for_deduplicates() {
        let mut rs = ResourceSet::new().with_registry(isolated_registry());
        let a = rs.proxy_for("x.xmi#//@a.0", None);
        let b = rs.proxy_for("x.xmi#//@a.0", None);
        let c = rs.proxy_for("x.xmi#//@a.1", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!rs.is_resolved(a));
    }

    #[test]
    fn test_missing_document_leaves_proxy() {
        let mut rs = ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new());
        let proxy = rs.proxy_for("absent.xmi#/", None);
        assert_eq!(rs.resolve(proxy), proxy);
        assert!(rs.graph().is_proxy(proxy));
        assert!(rs.resource_by_uri("absent.xmi").is_none());
    }

    #[test]
    fn test_unknown_fragment_can_be_polled() {
        let p = Package::new("resolve_poll", "http://resolve.test/poll", "rp");
        let node = p.define_class("Node", &[], false).unwrap();
        let mut rs = ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new());
        let res = rs.create_resource("present.xmi").unwrap();
        let root = rs.create(node).unwrap();
        rs.append(res, root).unwrap();

        let proxy = rs.proxy_for("present.xmi#//@missing.3", Some(node));
        for _ in 0..2 {
            assert_eq!(rs.resolve(proxy), proxy);
            assert!(!rs.is_resolved(proxy));
        }
        assert_eq!(rs.resources().count(), 1);
    }

    #[test]
    fn test_resolve_against_created_resource() {
        let p = Package::new("resolve_created", "http://resolve.test/created", "rc");
        let node = p.define_class("Node", &[], false).unwrap();
        let link = node
            .add_reference("link", node, Multiplicity::OPTIONAL, false)
            .unwrap();
        let mut rs = ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new());
        let target_res = rs.create_resource("target.xmi").unwrap();
        let target = rs.create(node).unwrap();
        rs.append(target_res, target).unwrap();

        let source = rs.create(node).unwrap();
        let proxy = rs.proxy_for("target.xmi#/", Some(node));
        rs.graph_mut().set(source, link, proxy).unwrap();
        assert_eq!(rs.resolve_reference(source, "link").unwrap(), vec![target]);
        assert!(rs.is_resolved(proxy));
        assert_eq!(rs.graph().get_object(source, link).unwrap(), Some(target));
        assert!(rs.graph().was_proxy(proxy));
    }
}
