//! Where document bytes come from and go to.

use std::fmt;
use std::io;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::base::Uri;

/// Byte-level access to documents by URI.
pub trait UriStore: Send + Sync + fmt::Debug {
    fn read(&self, uri: &Uri) -> io::Result<Vec<u8>>;
    fn write(&mut self, uri: &Uri, bytes: &[u8]) -> io::Result<()>;
    fn exists(&self, uri: &Uri) -> bool;
}

/// Reads and writes the local filesystem. A `file:` scheme is stripped;
/// other schemes are reported as not found.
#[derive(Debug, Default, Clone)]
pub struct FileStore;

impl FileStore {
    fn path(uri: &Uri) -> io::Result<PathBuf> {
        let doc = uri.document();
        let path = doc
            .strip_prefix("file://")
            .or_else(|| doc.strip_prefix("file:"))
            .unwrap_or(doc);
        if uri.has_scheme() && !doc.starts_with("file:") {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file for '{doc}'"),
            ));
        }
        Ok(PathBuf::from(path))
    }
}

impl UriStore for FileStore {
    fn read(&self, uri: &Uri) -> io::Result<Vec<u8>> {
        std::fs::read(Self::path(uri)?)
    }

    fn write(&mut self, uri: &Uri, bytes: &[u8]) -> io::Result<()> {
        let path = Self::path(uri)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    }

    fn exists(&self, uri: &Uri) -> bool {
        Self::path(uri).is_ok_and(|p| p.is_file())
    }
}

/// Keeps documents in memory, keyed by document URI.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    documents: FxHashMap<Uri, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document before handing the store to a resource set.
    pub fn with_document(mut self, uri: impl Into<Uri>, bytes: impl Into<Vec<u8>>) -> Self {
        let uri: Uri = uri.into();
        self.documents.insert(uri.document_uri(), bytes.into());
        self
    }

    pub fn get(&self, uri: &Uri) -> Option<&[u8]> {
        self.documents.get(&uri.document_uri()).map(Vec::as_slice)
    }
}

impl UriStore for MemoryStore {
    fn read(&self, uri: &Uri) -> io::Result<Vec<u8>> {
        self.get(uri).map(<[u8]>::to_vec).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no document '{uri}'"))
        })
    }

    fn write(&mut self, uri: &Uri, bytes: &[u8]) -> io::Result<()> {
        self.documents.insert(uri.document_uri(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, uri: &Uri) -> bool {
        self.documents.contains_key(&uri.document_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new().with_document("a.xmi", b"<a/>".to_vec());
        assert!(store.exists(&Uri::new("a.xmi#/")));
        assert_eq!(store.read(&Uri::new("a.xmi")).unwrap(), b"<a/>");
        store.write(&Uri::new("b.json"), b"{}").unwrap();
        assert_eq!(store.get(&Uri::new("b.json")), Some(&b"{}"[..]));
        let err = store.read(&Uri::new("missing.xmi")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.xmi");
        let uri = Uri::new(path.to_string_lossy());
        let mut store = FileStore;
        store.write(&uri, b"data").unwrap();
        assert!(store.exists(&uri));
        assert_eq!(store.read(&uri).unwrap(), b"data");
    }

    #[test]
    fn test_file_store_rejects_remote_schemes() {
        let err = FileStore.read(&Uri::new("http://example.org/m.xmi")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
