//! Arena-based XML tree.
//!
//! All nodes live in one vector; parent, child and sibling links are indices
//! into it. Node ids stay valid across every edit, so a node found before a
//! restructuring pass can still be addressed after its neighbours moved.
//!
//! Text is stored as ordinary child nodes. What XML tree APIs call the "tail"
//! of an element is simply the run of text siblings that follows it, and moves
//! with the surrounding siblings.

use crate::directive::{Computation, Directive, LoopId, RepeatMarker, Replacement};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// A prefixed XML name (`text:p`, `xlink:href`, `office:document-meta`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace prefix; empty for unprefixed names.
    pub prefix: String,
    pub local: String,
}

impl QName {
    pub fn new(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            local: local.into(),
        }
    }

    /// Split a qualified name at its first colon.
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) => Self::new(prefix, local),
            None => Self::new("", qualified),
        }
    }

    /// The name as written in markup.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }

    /// Whether this is a namespace declaration (`xmlns` or `xmlns:*`).
    pub fn is_xmlns(&self) -> bool {
        self.prefix == "xmlns" || (self.prefix.is_empty() && self.local == "xmlns")
    }
}

/// Element attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Element name, attributes and the computations attached by restructuring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attrs: Vec<Attribute>,
    /// Attribute computations evaluated when the start tag is emitted.
    pub computed: Vec<Computation>,
    /// Replace the whole element with a value.
    pub replace: Option<Replacement>,
    /// Replace the element's children with a value.
    pub content: Option<String>,
    /// Drop the tags but keep the children when this expression holds
    /// (an empty expression always strips).
    pub strip: Option<String>,
}

impl Default for QName {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Element {
    pub fn new(name: QName, attrs: Vec<Attribute>) -> Self {
        Self {
            name,
            attrs,
            ..Default::default()
        }
    }

    /// Find an attribute by its qualified name.
    pub fn attr(&self, qualified: &str) -> Option<&str> {
        let name = QName::parse(qualified);
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing any existing value.
    pub fn set_attr(&mut self, qualified: &str, value: impl Into<String>) {
        let name = QName::parse(qualified);
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute { name, value }),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attr(&mut self, qualified: &str) -> Option<String> {
        let name = QName::parse(qualified);
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos).value)
    }

    /// Whether the element carries any template annotation.
    pub fn is_annotated(&self) -> bool {
        !self.computed.is_empty()
            || self.replace.is_some()
            || self.content.is_some()
            || self.strip.is_some()
    }
}

/// Node type in the arena.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Document root.
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    /// Processing instruction, raw content including the target.
    Pi(String),
    /// XML declaration, raw content (`xml version="1.0" ...`).
    Decl(String),
    DocType(String),
    /// Control-flow directive wrapping its children.
    Directive(Directive),
    /// Record the cells counted by a column loop for its table.
    StoreColumnCount { loop_id: LoopId, table: String },
    /// Column definitions replayed once per counted column.
    RepeatMarker(RepeatMarker),
}

/// A node in the arena.
#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-based XML document.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a new empty document with a document root.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
        };
        doc.root = doc.alloc(NodeData::Document);
        doc
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    /// The document root (not the root element).
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The first element child of the document root.
    pub fn root_element(&self) -> NodeId {
        self.children(self.root)
            .find(|&id| self.is_element(id))
            .unwrap_or(NodeId::NONE)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Number of nodes ever allocated, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Create a detached node.
    pub fn create(&mut self, data: NodeData) -> NodeId {
        self.alloc(data)
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, name: QName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(NodeData::Element(Element::new(name, attrs)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()))
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.parent).unwrap_or(NodeId::NONE)
    }

    pub fn first_child(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.first_child).unwrap_or(NodeId::NONE)
    }

    pub fn last_child(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.last_child).unwrap_or(NodeId::NONE)
    }

    pub fn next_sibling(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE)
    }

    pub fn prev_sibling(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.prev_sibling).unwrap_or(NodeId::NONE)
    }

    /// Append a detached child as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.last_child(parent);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if let Some(last_node) = self.get_mut(last_child) {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a detached node immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.parent(sibling);
        let prev = self.prev_sibling(sibling);

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Insert a detached node immediately after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, new_node: NodeId) {
        let next = self.next_sibling(sibling);
        if next.is_some() {
            self.insert_before(next, new_node);
        } else {
            let parent = self.parent(sibling);
            self.append(parent, new_node);
        }
    }

    /// Unlink a node (and its subtree) from its parent.
    ///
    /// The node keeps its children and can be re-inserted elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.get(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }

        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Put the detached node `new_node` where `old` is, detaching `old`.
    pub fn replace(&mut self, old: NodeId, new_node: NodeId) {
        self.insert_before(old, new_node);
        self.detach(old);
    }

    /// Wrap everything strictly between two siblings into `wrapper`.
    ///
    /// Preconditions: `first` and `last` share a parent, `first` precedes
    /// `last`, and `wrapper` is detached.
    ///
    /// Postconditions: `wrapper` sits where `first` was and holds, in order,
    /// every node that was strictly between the two; `first` and `last` are
    /// detached. Text that followed `first` becomes the wrapper's leading
    /// text, text that followed `last` becomes the wrapper's trailing text.
    pub fn wrap_between(&mut self, first: NodeId, last: NodeId, wrapper: NodeId) {
        debug_assert_eq!(self.parent(first), self.parent(last));
        self.insert_before(first, wrapper);

        let mut current = self.next_sibling(first);
        while current.is_some() && current != last {
            let next = self.next_sibling(current);
            self.detach(current);
            self.append(wrapper, current);
            current = next;
        }

        self.detach(first);
        self.detach(last);
    }

    /// Detach a node, keeping the text that followed it in place.
    ///
    /// Text runs that become adjacent are merged into the earlier one.
    pub fn remove_keeping_tail(&mut self, id: NodeId) {
        let prev = self.prev_sibling(id);
        self.detach(id);
        self.merge_text_after(prev);
    }

    /// Merge the text node following `id` into `id` when both are text.
    fn merge_text_after(&mut self, id: NodeId) {
        loop {
            let next = self.next_sibling(id);
            let tail = match self.get(next).map(|n| &n.data) {
                Some(NodeData::Text(t)) => t.clone(),
                _ => return,
            };
            match self.get_mut(id).map(|n| &mut n.data) {
                Some(NodeData::Text(existing)) => existing.push_str(&tail),
                _ => return,
            }
            self.detach(next);
        }
    }

    /// Append text to the last child if it is text, or add a new text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.last_child(parent);

        if let Some(last) = self.get_mut(last_child) {
            if let NodeData::Text(ref mut existing) = last.data {
                existing.push_str(text);
                return;
            }
        }

        let text_node = self.create_text(text);
        self.append(parent, text_node);
    }

    /// Copy a subtree into a new detached subtree of this document.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let data = match self.get(id) {
            Some(node) => node.data.clone(),
            None => return NodeId::NONE,
        };
        let copy = self.alloc(data);
        let children: Vec<_> = self.children(id).collect();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Copy a subtree of another document into a new detached subtree here.
    pub fn import(&mut self, other: &Document, id: NodeId) -> NodeId {
        let Some(node) = other.get(id) else {
            return NodeId::NONE;
        };
        let copy = self.alloc(node.data.clone());
        for child in other.children(id) {
            let child_copy = self.import(other, child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Iterate over the children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        ChildrenIter {
            doc: self,
            current: self.first_child(parent),
        }
    }

    /// Element children of a node, in order.
    pub fn element_children(&self, parent: NodeId) -> Vec<NodeId> {
        self.children(parent)
            .filter(|&id| self.is_element(id))
            .collect()
    }

    /// Iterate over the ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> AncestorsIter<'_> {
        AncestorsIter {
            doc: self,
            current: self.parent(id),
        }
    }

    /// Pre-order traversal of a subtree, starting with `id` itself.
    pub fn descendants(&self, id: NodeId) -> DescendantsIter<'_> {
        DescendantsIter {
            doc: self,
            start: id,
            current: id,
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.get_mut(id).and_then(|n| match &mut n.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element(_)))
    }

    /// Get an attribute value by qualified name.
    pub fn attr(&self, id: NodeId, qualified: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(qualified))
    }

    /// Content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Text before the first non-text child.
    pub fn leading_text(&self, id: NodeId) -> String {
        self.text_run(self.first_child(id))
    }

    /// Text between a node and its next non-text sibling.
    pub fn trailing_text(&self, id: NodeId) -> String {
        self.text_run(self.next_sibling(id))
    }

    fn text_run(&self, mut current: NodeId) -> String {
        let mut out = String::new();
        while let Some(text) = self.text(current) {
            out.push_str(text);
            current = self.next_sibling(current);
        }
        out
    }

    /// Leading text nodes of a node, in order.
    pub fn leading_text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .take_while(|&child| self.text(child).is_some())
            .collect()
    }

    /// Concatenation of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Number of preceding siblings, text excluded.
    pub fn preceding_non_text_siblings(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut current = self.prev_sibling(id);
        while current.is_some() {
            if self.text(current).is_none() {
                count += 1;
            }
            current = self.prev_sibling(current);
        }
        count
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.doc.next_sibling(id);
        Some(id)
    }
}

/// Iterator over ancestors of a node.
pub struct AncestorsIter<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for AncestorsIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.doc.parent(id);
        Some(id)
    }
}

/// Pre-order iterator over a subtree.
pub struct DescendantsIter<'a> {
    doc: &'a Document,
    start: NodeId,
    current: NodeId,
}

impl Iterator for DescendantsIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;

        let first = self.doc.first_child(id);
        if first.is_some() {
            self.current = first;
            return Some(id);
        }

        let mut node = id;
        loop {
            if node == self.start {
                self.current = NodeId::NONE;
                break;
            }
            let next = self.doc.next_sibling(node);
            if next.is_some() {
                self.current = next;
                break;
            }
            node = self.doc.parent(node);
            if node.is_none() {
                self.current = NodeId::NONE;
                break;
            }
        }
        Some(id)
    }
}
