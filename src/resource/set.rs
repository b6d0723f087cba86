//! The resource set: shared graph, resources and resolution scope.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use super::registry::{PackageRegistration, PackageRegistry, ResourceSetOptions, SharedRegistry};
use super::store::{FileStore, UriStore};
use super::{Resource, ResourceError, ResourceId, fragment, global_registry};
use crate::base::Uri;
use crate::graph::{ModelError, ObjectGraph, ObjectId};
use crate::interchange::{LoadContext, ModelFormat, SaveContext, SaveOptions, Xmi};
use crate::meta::{Class, Classifier, DataType, Feature, Package, ecore};

/// A group of resources resolved against each other.
#[derive(Debug)]
pub struct ResourceSet {
    pub(crate) graph: ObjectGraph,
    pub(crate) resources: Vec<Option<Resource>>,
    pub(crate) by_uri: IndexMap<Uri, ResourceId>,
    pub(crate) root_owner: FxHashMap<ObjectId, ResourceId>,
    pub(crate) proxies: FxHashMap<Uri, ObjectId>,
    pub(crate) registry: PackageRegistry,
    pub(crate) shared: SharedRegistry,
    pub(crate) factories: IndexMap<String, Arc<dyn ModelFormat>>,
    pub(crate) fallback: Arc<dyn ModelFormat>,
    pub(crate) store: Box<dyn UriStore>,
    pub(crate) options: ResourceSetOptions,
    /// Objects of Ecore models standing for schema elements.
    pub(crate) meta_bindings: FxHashMap<ObjectId, MetaBinding>,
}

/// The schema element an Ecore model object was converted to or from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MetaBinding {
    Package(Package),
    Classifier(Classifier),
    DataType(DataType),
    Feature(Feature),
}

impl Default for ResourceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSet {
    /// A set using the global registry and the filesystem.
    pub fn new() -> Self {
        let xmi: Arc<dyn ModelFormat> = Arc::new(Xmi);
        let mut factories: IndexMap<String, Arc<dyn ModelFormat>> = IndexMap::new();
        factories.insert("xmi".into(), Arc::clone(&xmi));
        factories.insert("ecore".into(), Arc::clone(&xmi));
        Self {
            graph: ObjectGraph::new(),
            resources: Vec::new(),
            by_uri: IndexMap::new(),
            root_owner: FxHashMap::default(),
            proxies: FxHashMap::default(),
            registry: PackageRegistry::new(),
            shared: global_registry(),
            factories,
            fallback: xmi,
            store: Box::new(FileStore),
            options: ResourceSetOptions::default(),
            meta_bindings: FxHashMap::default(),
        }
    }

    /// Use `registry` instead of the global registry.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.shared = registry;
        self
    }

    pub fn with_store(mut self, store: impl UriStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_options(mut self, options: ResourceSetOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ResourceSetOptions {
        &self.options
    }

    // ── Graph ───────────────────────────────────────────────────────

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Mutable access to the graph. Roots moved into a container through the
    /// guard stop being roots of their resource when it is dropped.
    pub fn graph_mut(&mut self) -> GraphMut<'_> {
        GraphMut { set: self }
    }

    /// Drop roots that gained a container, so each object has one owner.
    fn release_contained_roots(&mut self) {
        let contained: Vec<(ObjectId, ResourceId)> = self
            .root_owner
            .iter()
            .filter(|(root, _)| self.graph.container(**root).is_some())
            .map(|(root, id)| (*root, *id))
            .collect();
        for (root, id) in contained {
            self.root_owner.remove(&root);
            if let Some(Some(resource)) = self.resources.get_mut(id.0 as usize) {
                resource.roots.retain(|r| *r != root);
            }
            tracing::trace!(%root, "root moved into a container");
        }
    }

    /// Shorthand for `graph_mut().create(class)`.
    pub fn create(&mut self, class: Class) -> Result<ObjectId, ModelError> {
        self.graph.create(class)
    }

    // ── Packages and formats ────────────────────────────────────────

    /// The set's own registry, consulted before the shared one.
    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PackageRegistry {
        &mut self.registry
    }

    pub fn shared_registry(&self) -> &SharedRegistry {
        &self.shared
    }

    /// Register a package in this set only.
    pub fn register_package(&mut self, package: Package) {
        self.registry.register(package);
    }

    /// Find the package for a namespace URI: local registry, then the shared
    /// registry, then the built-in Ecore package.
    pub fn lookup_package(&self, ns_uri: &str) -> Option<Package> {
        if let Some(p) = self.registry.get(ns_uri) {
            return Some(p);
        }
        if let Some(p) = self.shared.read().get(ns_uri) {
            return Some(p);
        }
        let e = ecore::ecore();
        (ns_uri == ecore::NS_URI).then_some(e.package)
    }

    /// Use `format` for documents with the given extension.
    pub fn register_factory(&mut self, extension: &str, format: impl ModelFormat + 'static) {
        self.factories
            .insert(extension.to_ascii_lowercase(), Arc::new(format));
    }

    /// The codec used for `uri`: by extension, falling back to XMI.
    pub fn format_for(&self, uri: &Uri) -> Arc<dyn ModelFormat> {
        uri.extension()
            .and_then(|ext| self.factories.get(&ext).cloned())
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    // ── Resources ───────────────────────────────────────────────────

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn resource_mut(&mut self, id: ResourceId) -> Result<&mut Resource, ResourceError> {
        self.resources
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ResourceError::UnknownResource(id))
    }

    pub(crate) fn resource_ref(&self, id: ResourceId) -> Result<&Resource, ResourceError> {
        self.resource(id).ok_or(ResourceError::UnknownResource(id))
    }

    pub fn resource_by_uri(&self, uri: impl Into<Uri>) -> Option<ResourceId> {
        let uri: Uri = uri.into();
        self.by_uri.get(&uri.document_uri()).copied()
    }

    /// All resources in creation order.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> + '_ {
        self.by_uri
            .values()
            .filter_map(|id| self.resource(*id).map(|r| (*id, r)))
    }

    /// Root objects of a resource.
    pub fn contents(&self, id: ResourceId) -> &[ObjectId] {
        self.resource(id).map(Resource::contents).unwrap_or_default()
    }

    /// Create an empty resource.
    pub fn create_resource(&mut self, uri: impl Into<Uri>) -> Result<ResourceId, ResourceError> {
        let uri: Uri = uri.into();
        let uri = uri.document_uri();
        if self.by_uri.contains_key(&uri) {
            return Err(ResourceError::AlreadyExists(uri));
        }
        let format = self.format_for(&uri);
        tracing::debug!(%uri, format = format.name(), "created resource");
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(Some(Resource::new(uri.clone(), format)));
        self.by_uri.insert(uri, id);
        Ok(id)
    }

    /// The resource for `uri`, loading it on first access.
    ///
    /// A registered package's nsURI is served by reflecting the package.
    pub fn get_resource(&mut self, uri: impl Into<Uri>) -> Result<ResourceId, ResourceError> {
        let uri: Uri = uri.into();
        let uri = uri.document_uri();
        if let Some(id) = self.by_uri.get(&uri) {
            return Ok(*id);
        }
        if let Some(package) = self.lookup_package(uri.as_str()) {
            return self.resource_from_package(uri, package);
        }
        let id = self.create_resource(uri.clone())?;
        if let Err(err) = self.load(id) {
            self.forget(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Read the resource's document from the store.
    pub fn load(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        let uri = self.resource_ref(id)?.uri().clone();
        let bytes = self.store.read(&uri).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound {
                    uri: uri.clone(),
                    source: Some(source),
                }
            } else {
                ResourceError::Io {
                    uri: uri.clone(),
                    source,
                }
            }
        })?;
        self.load_bytes(id, &bytes)
    }

    /// Replace the resource's content with the objects decoded from `bytes`.
    ///
    /// On failure nothing decoded from `bytes` stays in the graph.
    pub fn load_bytes(&mut self, id: ResourceId, bytes: &[u8]) -> Result<(), ResourceError> {
        let resource = self.resource_ref(id)?;
        let uri = resource.uri().clone();
        let format = resource.format();
        if !resource.contents().is_empty() {
            self.unload_contents(id)?;
        }
        tracing::debug!(%uri, format = format.name(), "loading resource");

        let mark = self.graph.mark();
        let result = {
            let mut ctx = LoadContext::new(self, id);
            format.read(bytes, &mut ctx).and_then(|()| ctx.finish())
        };
        if let Err(source) = result {
            self.graph.rollback(mark);
            let kept = self.graph.len();
            self.proxies.retain(|_, proxy| proxy.index() < kept);
            self.root_owner.retain(|_, owner| *owner != id);
            self.meta_bindings.retain(|obj, _| obj.index() < kept);
            self.resource_mut(id)?.clear();
            tracing::debug!(%uri, error = %source, "load failed");
            return Err(ResourceError::Load { uri, source });
        }
        self.resource_mut(id)?.loaded = true;
        let completed = self.complete_proxies(&uri);
        tracing::debug!(
            %uri,
            roots = self.contents(id).len(),
            completed,
            "loaded resource"
        );
        self.auto_register(id)
    }

    fn auto_register(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        let registration = self.options.registration;
        if registration == PackageRegistration::Explicit {
            return Ok(());
        }
        let e = ecore::ecore();
        let has_packages = self
            .contents(id)
            .iter()
            .any(|r| self.graph.is_instance(*r, e.e_package));
        if !has_packages {
            return Ok(());
        }
        for package in self.package_from_resource(id)? {
            match registration {
                PackageRegistration::Local => self.registry.register(package),
                PackageRegistration::Global => self.shared.write().register(package),
                PackageRegistration::Explicit => None,
            };
        }
        Ok(())
    }

    /// Encode the resource and write it to the store.
    pub fn save(&mut self, id: ResourceId, options: &SaveOptions) -> Result<(), ResourceError> {
        let bytes = self.save_bytes(id, options)?;
        let uri = self.resource_ref(id)?.uri().clone();
        self.store
            .write(&uri, &bytes)
            .map_err(|source| ResourceError::Io {
                uri: uri.clone(),
                source,
            })?;
        tracing::debug!(%uri, bytes = bytes.len(), "saved resource");
        Ok(())
    }

    /// Encode the resource.
    pub fn save_bytes(&mut self, id: ResourceId, options: &SaveOptions) -> Result<Vec<u8>, ResourceError> {
        if options.use_uuid {
            self.assign_uuids(id)?;
        }
        let resource = self.resource_ref(id)?;
        let uri = resource.uri().clone();
        let format = resource.format();
        let ctx = SaveContext::new(self, id, resource);
        format
            .write(&ctx, options)
            .map_err(|source| ResourceError::Save { uri, source })
    }

    fn assign_uuids(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        let objects: Vec<ObjectId> = self
            .contents(id)
            .iter()
            .flat_map(|root| std::iter::once(*root).chain(self.graph.all_contents(*root)))
            .collect();
        let resource = self.resource_mut(id)?;
        for object in objects {
            if resource.id_of(object).is_none() {
                let generated = format!("_{}", uuid::Uuid::new_v4());
                resource.set_id(object, &generated);
            }
        }
        Ok(())
    }

    /// Remove a resource from the set. Its objects stay in the graph but no
    /// longer belong to any resource.
    pub fn unload(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        self.unload_contents(id)?;
        self.forget(id);
        Ok(())
    }

    fn unload_contents(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        let resource = self.resource_mut(id)?;
        let roots = std::mem::take(&mut resource.roots);
        resource.clear();
        for root in roots {
            self.root_owner.remove(&root);
        }
        Ok(())
    }

    fn forget(&mut self, id: ResourceId) {
        if let Some(Some(resource)) = self.resources.get(id.0 as usize) {
            let uri = resource.uri().clone();
            self.by_uri.shift_remove(&uri);
        }
        if let Some(slot) = self.resources.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    // ── Roots ───────────────────────────────────────────────────────

    /// Make `object` a root of the resource, detaching it from any
    /// container or other resource first.
    pub fn append(&mut self, id: ResourceId, object: ObjectId) -> Result<(), ResourceError> {
        let object = self.graph.follow(object);
        self.resource_ref(id)?;
        if self.graph.is_proxy(object) {
            return Err(ModelError::UnresolvedProxy {
                id: object,
                uri: self
                    .graph
                    .proxy_uri(object)
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }
            .into());
        }
        self.graph.detach(object)?;
        if let Some(previous) = self.root_owner.get(&object).copied() {
            if previous == id {
                return Ok(());
            }
            self.remove_root(previous, object)?;
        }
        self.resource_mut(id)?.roots.push(object);
        self.root_owner.insert(object, id);
        Ok(())
    }

    /// Remove a root object from a resource. Returns whether it was a root.
    pub fn remove_root(&mut self, id: ResourceId, object: ObjectId) -> Result<bool, ResourceError> {
        let object = self.graph.follow(object);
        let resource = self.resource_mut(id)?;
        let Some(pos) = resource.roots.iter().position(|r| *r == object) else {
            return Ok(false);
        };
        resource.roots.remove(pos);
        self.root_owner.remove(&object);
        Ok(true)
    }

    /// The resource holding `object`, through the root of its tree.
    pub fn resource_of(&self, object: ObjectId) -> Option<ResourceId> {
        let root = self.graph.root(object);
        self.root_owner.get(&root).copied()
    }

    /// Absolute URI of `object`: its resource's URI plus its fragment.
    pub fn uri_of(&self, object: ObjectId) -> Option<Uri> {
        let object = self.graph.follow(object);
        if let Some(uri) = self.graph.proxy_uri(object) {
            return Some(uri.clone());
        }
        let resource = self.resource(self.resource_of(object)?)?;
        let fragment = fragment::fragment_of(&self.graph, resource, object)?;
        Some(resource.uri().with_fragment(&fragment))
    }

    /// The object a fragment designates inside a resource.
    pub fn object_at(&self, id: ResourceId, fragment: &str) -> Option<ObjectId> {
        fragment::resolve(&self.graph, self.resource(id)?, fragment)
    }
}

/// Exclusive graph access handed out by [`ResourceSet::graph_mut`].
pub struct GraphMut<'a> {
    set: &'a mut ResourceSet,
}

impl Deref for GraphMut<'_> {
    type Target = ObjectGraph;

    fn deref(&self) -> &ObjectGraph {
        &self.set.graph
    }
}

impl DerefMut for GraphMut<'_> {
    fn deref_mut(&mut self) -> &mut ObjectGraph {
        &mut self.set.graph
    }
}

impl Drop for GraphMut<'_> {
    fn drop(&mut self) {
        self.set.release_contained_roots();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interchange::Json;
    use crate::resource::{MemoryStore, isolated_registry};

    fn set() -> ResourceSet {
        ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new())
    }

    #[test]
    fn test_json_factory_is_per_set() {
        let mut rs = set();
        rs.register_factory("json", Json);
        let id = rs.create_resource("non_existing.json").unwrap();
        assert_eq!(rs.resource(id).unwrap().format_name(), "JSON");

        let mut other = set();
        let id = other.create_resource("non_existing.json").unwrap();
        assert_eq!(other.resource(id).unwrap().format_name(), "XMI");
    }

    #[test]
    fn test_create_resource_twice_fails() {
        let mut rs = set();
        rs.create_resource("a.xmi").unwrap();
        assert!(matches!(
            rs.create_resource("a.xmi#/"),
            Err(ResourceError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_missing_document_is_not_found() {
        let mut rs = set();
        let err = rs.get_resource("missing.xmi").unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
        assert!(rs.resource_by_uri("missing.xmi").is_none());
    }

    #[test]
    fn test_append_moves_between_resources() {
        let p = Package::new("append", "http://set.test/append", "ap");
        let c = p.define_class("Thing", &[], false).unwrap();
        let mut rs = set();
        let r1 = rs.create_resource("one.xmi").unwrap();
        let r2 = rs.create_resource("two.xmi").unwrap();
        let thing = rs.create(c).unwrap();
        rs.append(r1, thing).unwrap();
        assert_eq!(rs.resource_of(thing), Some(r1));
        rs.append(r2, thing).unwrap();
        assert!(rs.contents(r1).is_empty());
        assert_eq!(rs.contents(r2), &[thing]);
        assert_eq!(rs.uri_of(thing).unwrap().as_str(), "two.xmi#/");
    }

    #[test]
    fn test_containing_a_root_takes_it_from_its_resource() {
        let p = Package::new("adopt", "http://set.test/adopt", "pr");
        let node = p.define_class("N", &[], false).unwrap();
        node.add_reference("kids", node, crate::meta::Multiplicity::MANY, true)
            .unwrap();
        let mut rs = set();
        rs.register_package(p);
        let r1 = rs.create_resource("one.xmi").unwrap();
        let r2 = rs.create_resource("two.xmi").unwrap();
        let a = rs.create(node).unwrap();
        let b = rs.create(node).unwrap();
        rs.append(r1, a).unwrap();
        rs.append(r2, b).unwrap();

        rs.graph_mut().add(b, "kids", a).unwrap();
        assert!(rs.contents(r1).is_empty());
        assert_eq!(rs.contents(r2), &[b]);
        assert_eq!(rs.resource_of(a), Some(r2));
        assert_eq!(rs.uri_of(a).unwrap().as_str(), "two.xmi#//@kids.0");

        let one = String::from_utf8(rs.save_bytes(r1, &SaveOptions::default()).unwrap()).unwrap();
        assert!(!one.contains("pr:N"));
        let two = String::from_utf8(rs.save_bytes(r2, &SaveOptions::default()).unwrap()).unwrap();
        assert!(two.contains("<kids/>"));
    }

    #[test]
    fn test_lookup_order() {
        let shared = isolated_registry();
        let global_pkg = Package::new("lookup_g", "http://set.test/lookup", "g");
        shared.write().register(global_pkg);
        let mut rs = ResourceSet::new().with_registry(shared);
        assert_eq!(rs.lookup_package("http://set.test/lookup"), Some(global_pkg));

        let local_pkg = Package::new("lookup_l", "http://set.test/lookup", "l");
        rs.register_package(local_pkg);
        assert_eq!(rs.lookup_package("http://set.test/lookup"), Some(local_pkg));
        assert_eq!(
            rs.lookup_package(ecore::NS_URI),
            Some(ecore::ecore().package)
        );
    }
}
