//! Document identifiers.
//!
//! A [`Uri`] names a document (`tests/data/f1.json`, `http://test/1.0`) and
//! optionally an object inside it via the fragment (`f2.json#//B`). Relative
//! references found in documents are resolved against the URI of the document
//! that contains them, and hrefs are relativized again on save so that a set
//! of documents can be moved together.

use std::fmt;
use std::sync::Arc;

/// A document URI with an optional `#fragment`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(Arc<str>);

impl Uri {
    /// Create a URI, normalizing `.`/`..` path segments and `\` separators.
    pub fn new(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().replace('\\', "/");
        let (doc, frag) = split_fragment(&text);
        let mut normalized = normalize(doc);
        if let Some(frag) = frag {
            normalized.push('#');
            normalized.push_str(frag);
        }
        Self(normalized.into())
    }

    /// The full text of the URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The document part (everything before `#`).
    pub fn document(&self) -> &str {
        split_fragment(&self.0).0
    }

    /// The fragment (everything after `#`), if present.
    pub fn fragment(&self) -> Option<&str> {
        split_fragment(&self.0).1
    }

    /// This URI without its fragment.
    pub fn document_uri(&self) -> Uri {
        match self.fragment() {
            Some(_) => Self(self.document().into()),
            None => self.clone(),
        }
    }

    /// Replace the fragment.
    pub fn with_fragment(&self, fragment: &str) -> Uri {
        Self(format!("{}#{}", self.document(), fragment).into())
    }

    /// Lower-cased extension of the document part (`json` for `a/b.JSON`).
    pub fn extension(&self) -> Option<String> {
        let doc = self.document();
        let last = doc.rsplit('/').next().unwrap_or(doc);
        let (_, ext) = last.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Whether the URI starts with a scheme (`http:`, `file:`, ...).
    pub fn has_scheme(&self) -> bool {
        scheme_len(&self.0).is_some()
    }

    /// Resolve a reference found inside this document.
    ///
    /// `#frag` stays in this document, absolute paths and references with a
    /// scheme are taken as-is, everything else is relative to this
    /// document's directory.
    pub fn resolve(&self, reference: &str) -> Uri {
        let reference = reference.trim();
        if reference.is_empty() {
            return self.document_uri();
        }
        if let Some(frag) = reference.strip_prefix('#') {
            return self.with_fragment(frag);
        }
        if scheme_len(reference).is_some() || reference.starts_with('/') {
            return Uri::new(reference);
        }
        let doc = self.document();
        let dir = match doc.rfind('/') {
            Some(pos) => &doc[..=pos],
            None => "",
        };
        Uri::new(format!("{dir}{reference}"))
    }

    /// Express `target` relative to this document, the inverse of [`Uri::resolve`].
    ///
    /// Falls back to the target's full text when the two URIs do not share a
    /// root (different schemes, or absolute vs. relative paths).
    pub fn relativize(&self, target: &Uri) -> String {
        let frag = target
            .fragment()
            .map(|f| format!("#{f}"))
            .unwrap_or_default();
        if target.document() == self.document() {
            return frag;
        }
        let (base_root, base_path) = split_root(self.document());
        let (target_root, target_path) = split_root(target.document());
        if base_root != target_root {
            return target.as_str().to_string();
        }

        let base_dirs: Vec<&str> = {
            let mut segs: Vec<&str> = base_path.split('/').collect();
            segs.pop();
            segs.into_iter().filter(|s| !s.is_empty()).collect()
        };
        let target_segs: Vec<&str> = target_path.split('/').filter(|s| !s.is_empty()).collect();
        if base_dirs.iter().any(|s| *s == "..") {
            return target.as_str().to_string();
        }

        let common = base_dirs
            .iter()
            .zip(target_segs.iter())
            .take_while(|(a, b)| a == b)
            .count()
            .min(target_segs.len().saturating_sub(1));
        let mut out = String::new();
        for _ in common..base_dirs.len() {
            out.push_str("../");
        }
        out.push_str(&target_segs[common..].join("/"));
        out.push_str(&frag);
        out
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&Uri> for Uri {
    fn from(u: &Uri) -> Self {
        u.clone()
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn split_fragment(text: &str) -> (&str, Option<&str>) {
    match text.find('#') {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    }
}

/// Length of `scheme:` if the text starts with one. Single letters are
/// treated as drive letters, not schemes.
fn scheme_len(text: &str) -> Option<usize> {
    let colon = text.find(':')?;
    let scheme = &text[..colon];
    if scheme.len() < 2 {
        return None;
    }
    let mut chars = scheme.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    (first_ok && rest_ok).then_some(colon + 1)
}

/// Split a document into its non-path root (`http://host`, `file:/`, `/`, or
/// empty) and the path that follows, without a leading separator.
fn split_root(doc: &str) -> (&str, &str) {
    if let Some(len) = scheme_len(doc) {
        let rest = &doc[len..];
        if let Some(after) = rest.strip_prefix("//") {
            return match after.find('/') {
                Some(p) => (&doc[..len + 2 + p], &after[p + 1..]),
                None => (doc, ""),
            };
        }
        if rest.starts_with('/') {
            return (&doc[..=len], &rest[1..]);
        }
        return (&doc[..len], rest);
    }
    if let Some(path) = doc.strip_prefix('/') {
        return ("/", path);
    }
    ("", doc)
}

fn normalize(doc: &str) -> String {
    let (root, path) = split_root(doc);
    if path.is_empty() {
        return doc.to_string();
    }
    let mut segments: Vec<&str> = Vec::new();
    let parts: Vec<&str> = path.split('/').collect();
    let last = parts.len() - 1;
    for (i, seg) in parts.iter().enumerate() {
        match *seg {
            "." => {}
            "" if i != last => {}
            ".." => match segments.last() {
                Some(prev) if *prev != ".." => {
                    segments.pop();
                }
                _ if root.is_empty() => segments.push(".."),
                _ => {}
            },
            other => segments.push(other),
        }
    }
    let mut out = String::with_capacity(doc.len());
    out.push_str(root);
    if !root.is_empty() && !root.ends_with('/') && !root.ends_with(':') {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    out
}
