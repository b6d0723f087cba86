//! Foundation types for metaforge.
//!
//! This module provides fundamental types used throughout the engine:
//! - [`Uri`] - Document identifiers with fragments, relative resolution
//! - [`Name`], [`Interner`] - String interning for schema names
//!
//! This module has NO dependencies on other metaforge modules.

mod intern;
mod uri;

pub use intern::{Interner, Name};
pub use uri::Uri;
