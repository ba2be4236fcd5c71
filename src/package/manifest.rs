//! The package manifest, `META-INF/manifest.xml`.

use crate::dom::{Attribute, Document, MANIFEST_URI, NodeData, NodeId, QName, parse, write_document};
use crate::error::{Error, Result};

pub const MANIFEST_PATH: &str = "META-INF/manifest.xml";

/// Manifest with no entries, used when a package has to be built from
/// scratch.
const EMPTY_MANIFEST: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
    <manifest:manifest xmlns:manifest=\"urn:oasis:names:tc:opendocument:xmlns:manifest:1.0\" manifest:version=\"1.2\"></manifest:manifest>";

/// Editable list of `manifest:file-entry` records.
///
/// Entries keep the prefix the manifest binds to the manifest namespace;
/// everything the manifest carries besides the edited entries is written
/// back unchanged.
#[derive(Debug)]
pub struct Manifest {
    doc: Document,
    prefix: String,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = parse(bytes)?;
        let root = doc
            .element(doc.root_element())
            .ok_or_else(|| Error::InvalidPackage("manifest has no root element".into()))?;
        let prefix = root
            .attrs
            .iter()
            .find(|a| a.name.prefix == "xmlns" && a.value == MANIFEST_URI)
            .map(|a| a.name.local.clone())
            .unwrap_or_else(|| "manifest".to_string());
        Ok(Self { doc, prefix })
    }

    pub fn empty() -> Result<Self> {
        Self::parse(EMPTY_MANIFEST.as_bytes())
    }

    fn name(&self, local: &str) -> QName {
        QName::new(self.prefix.clone(), local)
    }

    fn entries(&self) -> impl Iterator<Item = NodeId> + '_ {
        let entry = self.name("file-entry");
        self.doc
            .children(self.doc.root_element())
            .filter(move |&id| self.doc.element(id).is_some_and(|el| el.name == entry))
    }

    fn full_path(&self, id: NodeId) -> Option<&str> {
        let attr = self.name("full-path");
        self.doc
            .element(id)?
            .attrs
            .iter()
            .find(|a| a.name == attr)
            .map(|a| a.value.as_str())
    }

    /// Full paths of all entries, in manifest order.
    pub fn paths(&self) -> Vec<&str> {
        self.entries().filter_map(|id| self.full_path(id)).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries().any(|id| self.full_path(id) == Some(path))
    }

    /// Media type recorded for `path`.
    pub fn media_type(&self, path: &str) -> Option<&str> {
        let attr = self.name("media-type");
        let id = self.entries().find(|&id| self.full_path(id) == Some(path))?;
        self.doc
            .element(id)?
            .attrs
            .iter()
            .find(|a| a.name == attr)
            .map(|a| a.value.as_str())
    }

    pub fn add_file_entry(&mut self, path: &str, media_type: &str) {
        let attrs = vec![
            Attribute {
                name: self.name("full-path"),
                value: path.to_string(),
            },
            Attribute {
                name: self.name("media-type"),
                value: media_type.to_string(),
            },
        ];
        let name = self.name("file-entry");
        let entry = self.doc.create_element(name, attrs);
        let root = self.doc.root_element();
        self.doc.append(root, entry);
    }

    /// Remove the entry for `path`. Returns whether there was one.
    ///
    /// Whitespace that indented the entry goes with it.
    pub fn remove_file_entry(&mut self, path: &str) -> bool {
        let Some(id) = self.entries().find(|&id| self.full_path(id) == Some(path)) else {
            return false;
        };
        let prev = self.doc.prev_sibling(id);
        if let Some(node) = self.doc.get(prev)
            && matches!(&node.data, NodeData::Text(t) if t.trim().is_empty())
        {
            self.doc.detach(prev);
        }
        self.doc.detach(id);
        true
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        write_document(&self.doc)
    }
}
