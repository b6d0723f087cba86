//! # metaforge-base
//!
//! Reflective metamodeling engine: dynamic schemas, a consistency-enforcing
//! object graph, and XMI/JSON persistence with lazy cross-document proxies.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! resource     → ResourceSet, registries, proxy resolution, Ecore bridge
//!   ↓ ↑
//! interchange  → ModelFormat trait, XMI and JSON codecs, SaveOptions
//!   ↓
//! graph        → ObjectGraph arena, containment/opposite synchronization
//!   ↓
//! meta         → Packages, classes, enumerations, features, built-in Ecore
//!   ↓
//! base         → Primitives (Uri, Name interning)
//! ```

// ============================================================================
// MODULES (dependency order: base → meta → graph → interchange → resource)
// ============================================================================

/// Foundation types: Uri, Name interning
pub mod base;

/// Metamodel: packages, classes, features and the Ecore meta-metamodel
pub mod meta;

/// Object graph: instances, values, containment and opposites
pub mod graph;

/// Model interchange formats: XMI, JSON
pub mod interchange;

/// Resources, resource sets, package registries and proxies
pub mod resource;

// Re-export foundation types
pub use base::{Name, Uri};

// Re-export the types most callers start from
pub use graph::{ModelError, ObjectGraph, ObjectId, Value};
pub use interchange::{InterchangeError, Json, ModelFormat, SaveOptions, Xmi};
pub use meta::{Class, DataType, Enumeration, Feature, Multiplicity, Package, SchemaError};
pub use resource::{ResourceError, ResourceId, ResourceSet};
