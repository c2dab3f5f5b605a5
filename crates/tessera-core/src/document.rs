//! # Document Arena
//!
//! The structured document the scheduler scans.
//!
//! Nodes live in a `BTreeMap` keyed by [`NodeId`]; parent and child links are
//! ids, never owning pointers, so detaching a subtree never requires graph
//! traversal to avoid leaks. Ids are allocated monotonically and never reused.
//!
//! HTML enters the arena through `scraper` (lenient, html5ever based) and
//! leaves it through [`Document::to_html`].

use crate::{NodeId, TesseraError};
use scraper::{ElementRef, Html, Node as HtmlNode};
use std::collections::BTreeMap;

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

// =============================================================================
// NODE KINDS
// =============================================================================

/// The payload of a document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root. Exactly one per document.
    Root,
    /// An element with a tag name and ordered attributes.
    Element {
        /// Lowercase tag name.
        tag: String,
        /// Attribute map.
        attributes: BTreeMap<String, String>,
    },
    /// A text node.
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Slot {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// An arena-backed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    /// Node storage: NodeId -> Slot
    nodes: BTreeMap<NodeId, Slot>,

    /// The root node (always present).
    root: NodeId,

    /// Next available NodeId
    next_node_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        let root = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(root, Slot::new(NodeKind::Root));
        Self {
            nodes,
            root,
            next_node_id: 1,
        }
    }
}

impl Document {
    /// Create an empty document containing only the root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a full HTML document.
    ///
    /// Parsing is lenient: malformed markup is repaired the way browsers do,
    /// so this never fails. The `<html>` element becomes the root's only child.
    #[must_use]
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut document = Self::new();
        let html_element = document.import_element(parsed.root_element());
        let root = document.root;
        document.link(root, html_element);
        document
    }

    /// Parse an HTML fragment and append its top-level nodes under `parent`.
    ///
    /// Returns the ids of the appended top-level nodes in document order.
    pub fn append_html(
        &mut self,
        parent: NodeId,
        fragment: &str,
    ) -> Result<Vec<NodeId>, TesseraError> {
        self.require_container(parent)?;
        let parsed = Html::parse_fragment(fragment);
        Ok(self.import_children(parent, parsed.root_element()))
    }

    fn import_element(&mut self, element: ElementRef<'_>) -> NodeId {
        let value = element.value();
        let attributes = value
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let id = self.allocate(NodeKind::Element {
            tag: value.name().to_string(),
            attributes,
        });
        self.import_children(id, element);
        id
    }

    fn import_children(&mut self, parent: NodeId, element: ElementRef<'_>) -> Vec<NodeId> {
        let mut created = Vec::new();
        for child in element.children() {
            let id = match child.value() {
                HtmlNode::Text(text) => self.create_text(&**text),
                HtmlNode::Element(_) => match ElementRef::wrap(child) {
                    Some(child_element) => self.import_element(child_element),
                    None => continue,
                },
                // Comments, doctypes and processing instructions are dropped.
                _ => continue,
            };
            self.link(parent, id);
            created.push(id);
        }
        created
    }

    // =========================================================================
    // STRUCTURE
    // =========================================================================

    /// The document root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the arena holds a node.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.allocate(NodeKind::Element {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.allocate(NodeKind::Text(text.into()))
    }

    fn allocate(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);
        self.nodes.insert(id, Slot::new(kind));
        id
    }

    /// Link without validation. Both ids must exist and `child` must be detached.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(slot) = self.nodes.get_mut(&child) {
            slot.parent = Some(parent);
        }
        if let Some(slot) = self.nodes.get_mut(&parent) {
            slot.children.push(child);
        }
    }

    fn require_container(&self, node: NodeId) -> Result<(), TesseraError> {
        match self.nodes.get(&node).map(|slot| &slot.kind) {
            None => Err(TesseraError::NodeNotFound(node)),
            Some(NodeKind::Text(_)) => Err(TesseraError::InvalidTreeOperation(format!(
                "text node {node} cannot have children"
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    ///
    /// Fails if either node is unknown, if `parent` is a text node, if
    /// `child` is the root, or if `child` is `parent` or one of its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TesseraError> {
        self.require_container(parent)?;
        if !self.contains(child) {
            return Err(TesseraError::NodeNotFound(child));
        }
        if child == self.root {
            return Err(TesseraError::InvalidTreeOperation(
                "the root cannot be appended".to_string(),
            ));
        }
        if child == parent || self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(TesseraError::InvalidTreeOperation(format!(
                "appending {child} under {parent} would create a cycle"
            )));
        }
        self.detach(child)?;
        self.link(parent, child);
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent. The nodes stay in the arena.
    pub fn detach(&mut self, node: NodeId) -> Result<(), TesseraError> {
        if node == self.root {
            return Err(TesseraError::InvalidTreeOperation(
                "the root cannot be detached".to_string(),
            ));
        }
        let parent = self
            .nodes
            .get_mut(&node)
            .ok_or(TesseraError::NodeNotFound(node))?
            .parent
            .take();
        if let Some(parent) = parent
            && let Some(slot) = self.nodes.get_mut(&parent)
        {
            slot.children.retain(|&c| c != node);
        }
        Ok(())
    }

    /// Detach a node and drop its whole subtree from the arena.
    ///
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, node: NodeId) -> Result<usize, TesseraError> {
        self.detach(node)?;
        let doomed: Vec<NodeId> = self.descendants(node).collect();
        for id in &doomed {
            self.nodes.remove(id);
        }
        Ok(doomed.len())
    }

    /// The parent of a node, if attached to one.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|slot| slot.parent)
    }

    /// Children of a node in document order (empty for unknown nodes).
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|slot| slot.children.as_slice())
            .unwrap_or_default()
    }

    /// Ancestors of a node, nearest first, excluding the node itself.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&current| self.parent(current))
    }

    /// The subtree rooted at `node` in document order (pre-order), `node` first.
    ///
    /// Yields nothing for unknown nodes.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let stack = if self.contains(node) {
            vec![node]
        } else {
            Vec::new()
        };
        Descendants {
            document: self,
            stack,
        }
    }

    /// Check whether a node is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        node == self.root || self.ancestors(node).any(|ancestor| ancestor == self.root)
    }

    // =========================================================================
    // ELEMENT ACCESS
    // =========================================================================

    /// The node payload.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&node).map(|slot| &slot.kind)
    }

    /// The tag name of an element.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Check if a node is an element.
    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        self.tag(node).is_some()
    }

    /// Read an attribute of an element.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    fn attributes_mut(
        &mut self,
        node: NodeId,
    ) -> Result<&mut BTreeMap<String, String>, TesseraError> {
        match self.nodes.get_mut(&node).map(|slot| &mut slot.kind) {
            None => Err(TesseraError::NodeNotFound(node)),
            Some(NodeKind::Element { attributes, .. }) => Ok(attributes),
            Some(_) => Err(TesseraError::InvalidTreeOperation(format!(
                "{node} is not an element"
            ))),
        }
    }

    /// Set (or replace) an attribute of an element.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TesseraError> {
        self.attributes_mut(node)?.insert(name.into(), value.into());
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<String>, TesseraError> {
        Ok(self.attributes_mut(node)?.remove(name))
    }

    /// Check if an element's `class` attribute contains a class token.
    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Add a class token to an element (no-op if already present).
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), TesseraError> {
        if self.has_class(node, class) {
            return Ok(());
        }
        let attributes = self.attributes_mut(node)?;
        let classes = attributes.entry("class".to_string()).or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class);
        Ok(())
    }

    /// The content of a text node.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of the subtree rooted at `node`.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|id| self.text(id))
            .collect()
    }

    /// Elements under `scope` (inclusive) carrying a class token, in document order.
    #[must_use]
    pub fn elements_by_class(&self, scope: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .filter(|&id| self.has_class(id, class))
            .collect()
    }

    /// First attached element, in document order, whose attribute `name` equals `value`.
    #[must_use]
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&id| self.attribute(id, name) == Some(value))
    }

    /// First attached element with the given tag, in document order.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&id| self.tag(id) == Some(tag))
    }

    // =========================================================================
    // SERIALIZATION
    // =========================================================================

    /// Serialize the subtree rooted at `node` as HTML.
    ///
    /// The root serializes as the concatenation of its children.
    #[must_use]
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            None => {}
            Some(NodeKind::Root) => {
                for &child in self.children(node) {
                    self.write_html(child, out);
                }
            }
            Some(NodeKind::Text(text)) => out.push_str(&escape_text(text)),
            Some(NodeKind::Element { tag, attributes }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for &child in self.children(node) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Pre-order iterator over a subtree. See [`Document::descendants`].
#[derive(Debug)]
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push in reverse so the first child is visited next.
        self.stack
            .extend(self.document.children(node).iter().rev().copied());
        Some(node)
    }
}

// =============================================================================
// TESTS
// =============================================================================
