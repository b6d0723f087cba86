//! Interning of schema names.
//!
//! Class, feature and literal names plus namespace URIs repeat across every
//! package and every object that reads them. The metamodel arena interns them
//! once so handles can hand out `Arc<str>` clones.

use rustc_hash::FxHashSet;
use std::sync::Arc;

/// An interned name.
pub type Name = Arc<str>;

/// Deduplicating store of names. Interning the same text twice yields the
/// same allocation.
#[derive(Debug, Default, Clone)]
pub struct Interner {
    names: FxHashSet<Name>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Name {
        match self.names.get(text) {
            Some(name) => Arc::clone(name),
            None => {
                let name: Name = Arc::from(text);
                self.names.insert(Arc::clone(&name));
                name
            }
        }
    }

    /// The interned name for `text`, if any.
    pub fn lookup(&self, text: &str) -> Option<Name> {
        self.names.get(text).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
