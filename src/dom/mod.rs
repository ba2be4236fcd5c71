//! XML document trees.
//!
//! Parts are parsed into an arena tree ([`Document`]) that the restructurer
//! edits in place through a small set of editing primitives, then walked by the
//! render engine.

mod namespaces;
mod parse;
mod serialize;
mod tree;

pub use namespaces::{MANIFEST_URI, Namespaces, OFFICE_URI};
pub use parse::{parse, parse_str};
pub use serialize::{XmlWriter, write_document};
pub use tree::{
    AncestorsIter, Attribute, ChildrenIter, DescendantsIter, Document, Element, Node, NodeData,
    NodeId, QName,
};
