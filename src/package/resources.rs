//! Content-addressed pictures produced while rendering.

use std::collections::HashSet;

use crate::util::MediaFormat;

/// Directory of stored pictures.
pub const PICTURES_DIR: &str = "Pictures/";

/// A picture waiting to be written to the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// Archive path of a resource: the content hash plus an extension guessed
/// from the mime type.
pub fn resource_path(data: &[u8], mime: &str) -> String {
    let hash = sha1_smol::Sha1::from(data).hexdigest();
    format!(
        "{PICTURES_DIR}{hash}{}",
        MediaFormat::from_mime(mime).extension()
    )
}

/// Registers each distinct resource once and holds it until the packager
/// can write it.
#[derive(Debug, Default)]
pub struct ResourceStore {
    known: HashSet<String>,
    pending: Vec<Resource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register content and return its archive path. Identical content is
    /// stored only once.
    pub fn add(&mut self, data: Vec<u8>, mime: &str) -> String {
        let path = resource_path(&data, mime);
        if self.known.insert(path.clone()) {
            tracing::debug!(path = %path, mime, size = data.len(), "stored resource");
            self.pending.push(Resource {
                path: path.clone(),
                mime: mime.to_string(),
                data,
            });
        }
        path
    }

    /// Resources registered since the last call.
    pub fn take_pending(&mut self) -> Vec<Resource> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of distinct resources registered so far.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_hash_and_extension() {
        let path = resource_path(b"abc", "image/png");
        assert_eq!(path, "Pictures/a9993e364706816aba3e25717850c26c9cd0d89d.png");
        assert_eq!(
            resource_path(b"abc", "application/x-unknown"),
            "Pictures/a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_identical_content_is_stored_once() {
        let mut store = ResourceStore::new();
        let a = store.add(b"0123456789".to_vec(), "image/png");
        let b = store.add(b"0123456789".to_vec(), "image/png");
        let c = store.add(b"other".to_vec(), "image/jpeg");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);

        let pending = store.take_pending();
        assert_eq!(pending.len(), 2);
        assert!(!store.has_pending());
        store.add(b"0123456789".to_vec(), "image/png");
        assert!(!store.has_pending());
    }
}
