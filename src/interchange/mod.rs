//! Model interchange formats.
//!
//! This module provides serialization and deserialization of object graphs:
//!
//! - **XMI** - XML Metadata Interchange (`.xmi`, `.ecore`)
//! - **JSON** - nested JSON objects with `eClass` type tags (`.json`)
//!
//! ## Architecture
//!
//! Formats never own objects. A [`ResourceSet`](crate::resource::ResourceSet)
//! hands them a context borrowed from itself:
//!
//! ```text
//! ┌──────────────┐                          ┌──────────────┐
//! │   XMI File   │                          │  JSON File   │
//! └──────┬───────┘                          └──────┬───────┘
//!        │                                         │
//!        ▼                                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ModelFormat trait                      │
//! │  - read(&[u8], &mut LoadContext)                         │
//! │  - write(&SaveContext, &SaveOptions) -> Vec<u8>          │
//! └──────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │               ResourceSet (ObjectGraph + proxies)         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use metaforge::resource::ResourceSet;
//! use metaforge::interchange::{Json, SaveOptions};
//!
//! let mut rs = ResourceSet::new();
//! rs.register_factory("json", Json);
//! let library = rs.get_resource("library.xmi")?;
//! rs.save(library, &SaveOptions::default())?;
//! ```

mod context;
mod error;
mod format;
mod json;
mod options;
mod xmi;

pub use context::{LoadContext, ReferenceTarget, SaveContext};
pub use error::InterchangeError;
pub use format::ModelFormat;
pub use json::Json;
pub use options::SaveOptions;
pub use xmi::{Xmi, namespace};

/// Supported file extensions for interchange formats.
pub fn supported_extensions() -> &'static [&'static str] {
    &["xmi", "ecore", "json"]
}

/// Detect format from file extension.
pub fn detect_format(extension: &str) -> Option<Box<dyn ModelFormat>> {
    match extension.to_lowercase().as_str() {
        "xmi" | "ecore" => Some(Box::new(Xmi)),
        "json" => Some(Box::new(Json)),
        _ => None,
    }
}

/// Detect format from MIME type.
pub fn detect_format_from_mime(mime: &str) -> Option<Box<dyn ModelFormat>> {
    match mime {
        "application/xmi+xml" | "application/xml" => Some(Box::new(Xmi)),
        "application/json" => Some(Box::new(Json)),
        _ => None,
    }
}
