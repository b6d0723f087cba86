//! Resources, resource sets, registries and proxy resolution.
//!
//! ```text
//! ResourceSet
//!   ├── ObjectGraph            every object of every resource, plus proxies
//!   ├── resources              uri → Resource { roots, ids, format }
//!   ├── proxy table            absolute uri → proxy slot
//!   ├── local PackageRegistry  consulted before the shared registry
//!   └── format factories       extension → ModelFormat
//! ```
//!
//! Loading a document creates its objects in the shared graph and turns
//! references into other documents into proxies. Proxies are resolved on
//! demand through [`ResourceSet::resolve`], which loads the target document
//! if needed, and eagerly whenever their document is loaded later on.

mod bridge;
mod fragment;
mod registry;
mod resolve;
mod set;
mod store;

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::base::Uri;
use crate::graph::{ModelError, ObjectId};
use crate::interchange::{InterchangeError, ModelFormat};
use crate::meta::SchemaError;

pub use registry::{
    PackageRegistration, PackageRegistry, ResourceSetOptions, SharedRegistry, global_registry,
    isolated_registry,
};
pub use set::{GraphMut, ResourceSet};
pub use store::{FileStore, MemoryStore, UriStore};

/// Errors raised by resource operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("document not found: {uri}")]
    NotFound {
        uri: Uri,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("a resource for '{0}' already exists")]
    AlreadyExists(Uri),

    #[error("failed to load '{uri}': {source}")]
    Load {
        uri: Uri,
        #[source]
        source: InterchangeError,
    },

    #[error("failed to save '{uri}': {source}")]
    Save {
        uri: Uri,
        #[source]
        source: InterchangeError,
    },

    #[error("IO error on '{uri}': {source}")]
    Io {
        uri: Uri,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Interchange(#[from] InterchangeError),

    #[error("no resource {0:?}")]
    UnknownResource(ResourceId),
}

impl ResourceError {
    /// The underlying codec error of a failed load.
    pub fn load_source(&self) -> Option<&InterchangeError> {
        match self {
            ResourceError::Load { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Identifier of a resource within its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// One document: its URI, root objects and codec.
#[derive(Debug, Clone)]
pub struct Resource {
    uri: Uri,
    format: Arc<dyn ModelFormat>,
    roots: Vec<ObjectId>,
    ids: IndexMap<ObjectId, Arc<str>>,
    by_id: FxHashMap<Arc<str>, ObjectId>,
    loaded: bool,
}

impl Resource {
    pub(crate) fn new(uri: Uri, format: Arc<dyn ModelFormat>) -> Self {
        Self {
            uri,
            format,
            roots: Vec::new(),
            ids: IndexMap::new(),
            by_id: FxHashMap::default(),
            loaded: false,
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Name of the codec used for this resource.
    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    pub(crate) fn format(&self) -> Arc<dyn ModelFormat> {
        Arc::clone(&self.format)
    }

    /// Root objects in document order.
    pub fn contents(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Whether the resource was filled from a document.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Document identifier of `object`, if it has one.
    pub fn id_of(&self, object: ObjectId) -> Option<&str> {
        self.ids.get(&object).map(|s| &**s)
    }

    pub fn object_by_id(&self, id: &str) -> Option<ObjectId> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn set_id(&mut self, object: ObjectId, id: &str) {
        let id: Arc<str> = id.into();
        if let Some(old) = self.ids.insert(object, Arc::clone(&id)) {
            self.by_id.remove(&old);
        }
        self.by_id.insert(id, object);
    }

    pub(crate) fn clear(&mut self) {
        self.roots.clear();
        self.ids.clear();
        self.by_id.clear();
        self.loaded = false;
    }
}
