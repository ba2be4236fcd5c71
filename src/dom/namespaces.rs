//! Namespace table resolved from a document's root declarations.
//!
//! Names in the tree keep the prefixes they were written with. Matching goes
//! through the namespace URI, so a document that binds the text namespace to
//! an unusual prefix is still recognised.

use std::collections::HashMap;

use super::tree::{Document, NodeId, QName};

/// Synthetic URIs for the prefixes the restructurer relies on, used when a
/// document does not declare them.
const DEFAULTS: &[(&str, &str)] = &[
    ("text", "urn:text"),
    ("draw", "urn:draw"),
    ("table", "urn:table"),
    ("office", "urn:office"),
    ("xlink", "urn:xlink"),
    ("svg", "urn:svg"),
];

pub const MANIFEST_URI: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";
pub const OFFICE_URI: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";

/// Prefix to URI table for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    map: HashMap<String, String>,
}

impl Namespaces {
    /// Table holding only the synthetic defaults.
    pub fn defaults() -> Self {
        let map = DEFAULTS
            .iter()
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect();
        Self { map }
    }

    /// Defaults overridden by the declarations on the root element.
    pub fn from_document(doc: &Document) -> Self {
        let mut ns = Self::defaults();
        if let Some(root) = doc.element(doc.root_element()) {
            for attr in &root.attrs {
                if attr.name.prefix == "xmlns" {
                    ns.map.insert(attr.name.local.clone(), attr.value.clone());
                } else if attr.name.is_xmlns() {
                    ns.map.insert(String::new(), attr.value.clone());
                }
            }
        }
        ns
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.map.get(prefix).map(String::as_str)
    }

    /// Whether the document itself declares `prefix` (synthetic defaults
    /// don't count).
    pub fn declares(&self, prefix: &str) -> bool {
        match self.map.get(prefix) {
            Some(uri) => !DEFAULTS.iter().any(|(p, u)| *p == prefix && u == uri),
            None => false,
        }
    }

    /// Whether `name` is `local` in the namespace bound to `prefix`.
    pub fn matches(&self, name: &QName, prefix: &str, local: &str) -> bool {
        if name.local != local {
            return false;
        }
        match (self.uri(&name.prefix), self.uri(prefix)) {
            (Some(a), Some(b)) => a == b,
            _ => name.prefix == prefix,
        }
    }

    /// Whether `name` lives in the namespace bound to `prefix`.
    pub fn in_namespace(&self, name: &QName, prefix: &str) -> bool {
        match (self.uri(&name.prefix), self.uri(prefix)) {
            (Some(a), Some(b)) => a == b,
            _ => name.prefix == prefix,
        }
    }

    /// Whether the node is the element `prefix:local`.
    pub fn is(&self, doc: &Document, id: NodeId, prefix: &str, local: &str) -> bool {
        doc.element(id)
            .is_some_and(|el| self.matches(&el.name, prefix, local))
    }

    /// The prefix this document uses for the namespace known as `prefix`.
    pub fn local_prefix(&self, prefix: &str) -> String {
        let Some(uri) = self.uri(prefix) else {
            return prefix.to_string();
        };
        if self.map.get(prefix).is_some_and(|u| u == uri) {
            return prefix.to_string();
        }
        self.map
            .iter()
            .find(|(_, u)| *u == uri)
            .map(|(p, _)| p.clone())
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Qualified name `prefix:local` using this document's prefix.
    pub fn qualify(&self, prefix: &str, local: &str) -> String {
        QName::new(self.local_prefix(prefix), local).qualified()
    }

    /// Find an attribute of `id` by namespace and local name.
    pub fn attr<'d>(
        &self,
        doc: &'d Document,
        id: NodeId,
        prefix: &str,
        local: &str,
    ) -> Option<&'d str> {
        doc.element(id)?
            .attrs
            .iter()
            .find(|a| self.matches(&a.name, prefix, local))
            .map(|a| a.value.as_str())
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::defaults()
    }
}
