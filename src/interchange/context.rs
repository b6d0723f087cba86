//! What a codec sees of the resource set while reading or writing.
//!
//! Codecs decode into a [`LoadContext`] and encode from a [`SaveContext`].
//! Both hide resource bookkeeping (roots, ids, proxies) behind a few calls so
//! the XMI and JSON codecs only deal with their own syntax.

use crate::base::Uri;
use crate::graph::{ObjectGraph, ObjectId, Value};
use crate::meta::{Class, Classifier, Feature, Package};
use crate::resource::{Resource, ResourceId, ResourceSet};

use super::InterchangeError;

/// A reference whose target is only known once the whole document is read.
#[derive(Debug, Clone)]
struct Deferred {
    object: ObjectId,
    feature: Feature,
    text: String,
    hint: Option<Class>,
}

/// Decoding target handed to [`ModelFormat::read`](super::ModelFormat::read).
pub struct LoadContext<'a> {
    set: &'a mut ResourceSet,
    resource: ResourceId,
    uri: Uri,
    deferred: Vec<Deferred>,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(set: &'a mut ResourceSet, resource: ResourceId) -> Self {
        let uri = set
            .resource(resource)
            .map(|r| r.uri().clone())
            .unwrap_or_else(|| Uri::new(""));
        Self {
            set,
            resource,
            uri,
            deferred: Vec::new(),
        }
    }

    /// URI of the document being read.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn graph(&self) -> &ObjectGraph {
        self.set.graph()
    }

    /// The package registered for `ns_uri`.
    pub fn package(&self, ns_uri: &str) -> Result<Package, InterchangeError> {
        self.set
            .lookup_package(ns_uri)
            .ok_or_else(|| InterchangeError::UnknownPackage(ns_uri.to_string()))
    }

    /// A class named by `package`'s nsURI plus a `//Name` fragment.
    pub fn class_from_uri(&self, text: &str) -> Result<Class, InterchangeError> {
        let (ns_uri, fragment) = text
            .split_once('#')
            .ok_or_else(|| InterchangeError::invalid_value("eClass", format!("'{text}' has no fragment")))?;
        let package = self.package(ns_uri)?;
        Self::class_in(package, fragment.trim_start_matches('/'))
    }

    /// A class of `package` by (possibly `sub/`-qualified) name.
    pub fn class_in(package: Package, name: &str) -> Result<Class, InterchangeError> {
        package
            .classifier_at(name)
            .and_then(Classifier::as_class)
            .ok_or_else(|| InterchangeError::unknown_class(package.name().to_string(), name))
    }

    /// Create an object of `class`.
    pub fn create(&mut self, class: Class) -> Result<ObjectId, InterchangeError> {
        let id = self.set.graph.create(class)?;
        tracing::trace!(%id, class = %class.name(), "decoded object");
        Ok(id)
    }

    /// Store `value`, adding to many-valued features.
    pub fn set_value(&mut self, object: ObjectId, feature: Feature, value: Value) -> Result<(), InterchangeError> {
        let graph = &mut self.set.graph;
        if feature.is_many() {
            graph.add(object, feature, value)?;
        } else {
            graph.set(object, feature, value)?;
        }
        Ok(())
    }

    /// Decode `text` for an attribute and store it.
    pub fn set_text(&mut self, object: ObjectId, feature: Feature, text: &str) -> Result<(), InterchangeError> {
        let ty = feature.value_type().ok_or_else(|| {
            InterchangeError::invalid_value(feature.name().to_string(), "a reference cannot hold text")
        })?;
        let value =
            Value::parse(text, &ty).map_err(|message| InterchangeError::invalid_value(feature.name().to_string(), message))?;
        self.set_value(object, feature, value)
    }

    /// Make `object` the next root of the document.
    pub fn add_root(&mut self, object: ObjectId) -> Result<(), InterchangeError> {
        self.set
            .append(self.resource, object)
            .map_err(|e| InterchangeError::malformed(format!("cannot add root {object}: {e}")))
    }

    /// Remember the document identifier of `object`.
    pub fn record_id(&mut self, object: ObjectId, id: &str) {
        if let Ok(resource) = self.set.resource_mut(self.resource) {
            resource.set_id(object, id);
        }
    }

    /// Queue a reference given as text: an in-document fragment or id, or
    /// an href into another document. `hint` is the class the document
    /// announces for the target, if any.
    pub fn defer(&mut self, object: ObjectId, feature: Feature, text: &str, hint: Option<Class>) {
        self.deferred.push(Deferred {
            object,
            feature,
            text: text.to_string(),
            hint,
        });
    }

    /// Resolve every queued reference. In-document references must resolve;
    /// references into other documents become proxies.
    pub(crate) fn finish(&mut self) -> Result<(), InterchangeError> {
        let deferred = std::mem::take(&mut self.deferred);
        tracing::trace!(references = deferred.len(), uri = %self.uri, "linking references");
        for d in deferred {
            let target = self.reference_target(&d.text, d.feature, d.hint)?;
            self.set_value(d.object, d.feature, Value::Object(target))?;
        }
        Ok(())
    }

    fn reference_target(
        &mut self,
        text: &str,
        feature: Feature,
        hint: Option<Class>,
    ) -> Result<ObjectId, InterchangeError> {
        let text = text.trim();
        let Some((document, _)) = text.split_once('#') else {
            return self.local(text);
        };
        if document.is_empty() {
            return self.local(&text[1..]);
        }
        let absolute = self.uri.resolve(text);
        if absolute.document_uri() == self.uri.document_uri() {
            return self.local(absolute.fragment().unwrap_or("/"));
        }
        let expected = hint.or_else(|| feature.target());
        let proxy = self.set.proxy_for(absolute.clone(), expected);
        if let Some(target) = self.set.loaded_object(&absolute) {
            self.set.graph.resolve_proxy(proxy, target)?;
        }
        Ok(proxy)
    }

    fn local(&self, fragment: &str) -> Result<ObjectId, InterchangeError> {
        let fragment = if fragment.is_empty() { "/" } else { fragment };
        self.set
            .object_at(self.resource, fragment)
            .ok_or_else(|| InterchangeError::UnresolvedReference(format!("{}#{fragment}", self.uri)))
    }
}

/// Where a reference written by a codec points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// A fragment within the document being written.
    Local(String),
    /// An href into another document, with the target's class when known.
    External { href: String, class: Option<Class> },
}

/// Encoding source handed to [`ModelFormat::write`](super::ModelFormat::write).
pub struct SaveContext<'a> {
    set: &'a ResourceSet,
    resource: ResourceId,
    data: &'a Resource,
}

impl<'a> SaveContext<'a> {
    pub(crate) fn new(set: &'a ResourceSet, resource: ResourceId, data: &'a Resource) -> Self {
        Self {
            set,
            resource,
            data,
        }
    }

    pub fn graph(&self) -> &'a ObjectGraph {
        self.set.graph()
    }

    /// Root objects to write, in order.
    pub fn roots(&self) -> &'a [ObjectId] {
        self.data.contents()
    }

    pub fn uri(&self) -> &'a Uri {
        self.data.uri()
    }

    /// Identifier to write for `object`, if it has one.
    pub fn id_of(&self, object: ObjectId) -> Option<&'a str> {
        self.data.id_of(self.set.graph().follow(object))
    }

    /// The package registered for `ns_uri`, used to pick namespace prefixes.
    pub fn package(&self, ns_uri: &str) -> Option<Package> {
        self.set.lookup_package(ns_uri)
    }

    /// How to write a reference to `target`.
    pub fn reference(&self, target: ObjectId) -> Result<ReferenceTarget, InterchangeError> {
        let graph = self.set.graph();
        let target = graph.follow(target);
        if let Some(uri) = graph.proxy_uri(target) {
            return Ok(ReferenceTarget::External {
                href: self.uri().relativize(uri),
                class: graph.proxy_expected_type(target),
            });
        }
        let owner = self.set.resource_of(target).ok_or_else(|| {
            InterchangeError::UnresolvedReference(format!("{target} is not contained in any resource"))
        })?;
        let uri = self
            .set
            .uri_of(target)
            .ok_or_else(|| InterchangeError::UnresolvedReference(format!("no fragment for {target}")))?;
        if owner == self.resource {
            return Ok(ReferenceTarget::Local(uri.fragment().unwrap_or("/").to_string()));
        }
        Ok(ReferenceTarget::External {
            href: self.uri().relativize(&uri),
            class: graph.class_of(target),
        })
    }
}
