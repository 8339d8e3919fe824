//! In-memory document model for rendered page markup.
//!
//! Pages arrive as HTML fragments. They are parsed into an arena tree so the
//! highlight mapper can walk text nodes, split them and wrap fragments in
//! marks, then serialized back for display.

mod parse;
mod sanitize;
mod serialize;

use crate::error::Result;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element name and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    /// Attributes in source order.
    pub attrs: Vec<(String, String)>,
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// An element with children.
    Element(Element),
    /// A run of text.
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree. The root is an anonymous fragment element
/// that is never serialized itself.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

/// Elements that never have children or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty fragment.
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element(Element {
                name: String::new(),
                attrs: Vec::new(),
            }),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Parse an HTML or XHTML fragment. Parsing is lenient about void
    /// elements and unbalanced end tags.
    pub fn parse(markup: &str) -> Result<Self> {
        parse::parse_markup(markup)
    }

    /// Root of the fragment.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Payload of a node.
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    /// Parent of a node, `None` for the root and detached nodes.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children in document order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    /// Element payload of an element node.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id).data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    /// Tag name of an element node.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Attribute value of an element node.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element(element) = &mut self.node_mut(id).data {
            match element.attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => element.attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Replace the contents of a text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeData::Text(existing) = &mut self.node_mut(id).data {
            *existing = text.to_string();
        }
    }

    /// Allocate a detached element.
    pub fn create_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeData::Element(Element {
            name: name.to_ascii_lowercase(),
            attrs,
        }))
    }

    /// Allocate a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Insert `child` into `reference`'s parent right before `reference`.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(child);
        let index = self.index_in_parent(reference).unwrap_or(0);
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Insert `child` into `reference`'s parent right after `reference`.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        self.detach(child);
        let index = self
            .index_in_parent(reference)
            .map(|i| i + 1)
            .unwrap_or_else(|| self.node(parent).children.len());
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Number of nodes held in the arena, attached or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Drop nodes that are no longer reachable from the root and renumber
    /// the rest in document order. Ids obtained before the call are invalid
    /// afterwards.
    pub fn compact(&mut self) {
        let mut order = vec![self.root];
        order.extend(self.descendants(self.root));
        if order.len() == self.nodes.len() {
            return;
        }

        let mut remap = vec![None; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(NodeId(new));
        }
        let mut nodes = Vec::with_capacity(order.len());
        for old in &order {
            let node = &mut self.nodes[old.0];
            nodes.push(Node {
                data: std::mem::replace(&mut node.data, NodeData::Text(String::new())),
                parent: node.parent.and_then(|p| remap[p.0]),
                children: node.children.iter().filter_map(|c| remap[c.0]).collect(),
            });
        }
        self.nodes = nodes;
        self.root = NodeId(0);
    }

    /// Remove a node from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|&c| c != id);
        }
    }

    /// Replace an element with its own children.
    pub fn unwrap_element(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        let Some(index) = self.index_in_parent(id) else {
            return;
        };
        let children = std::mem::take(&mut self.node_mut(id).children);
        for &child in &children {
            self.node_mut(child).parent = Some(parent);
        }
        let siblings = &mut self.node_mut(parent).children;
        siblings.splice(index..=index, children);
        self.node_mut(id).parent = None;
    }

    fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.node(parent).children.iter().position(|&c| c == id)
    }

    /// All nodes below `id` in document (pre-)order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next).children.iter().rev().copied());
        }
        out
    }

    /// Whether `node` is `ancestor` or lies beneath it.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Nearest inclusive ancestor matching `predicate`.
    pub fn closest(&self, node: NodeId, predicate: impl Fn(&Document, NodeId) -> bool) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if predicate(self, id) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Concatenated text beneath `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Merge adjacent text nodes and drop empty ones beneath `id`.
    pub fn normalize(&mut self, id: NodeId) {
        let children = self.node(id).children.clone();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            if let NodeData::Text(text) = &self.node(child).data {
                if text.is_empty() {
                    self.node_mut(child).parent = None;
                    continue;
                }
                if let Some(&last) = kept.last()
                    && let Some(previous) = self.text(last)
                {
                    let merged = format!("{}{}", previous, text);
                    self.set_text(last, &merged);
                    self.node_mut(child).parent = None;
                    continue;
                }
            } else {
                self.normalize(child);
            }
            kept.push(child);
        }
        self.node_mut(id).children = kept;
    }

    /// Strip active content. See [`sanitize`](self::sanitize).
    pub fn sanitize(&mut self) {
        sanitize::sanitize(self);
    }

    /// Serialize the whole fragment.
    pub fn to_html(&self) -> String {
        serialize::serialize_children(self, self.root)
    }

    /// Serialize a single node including its own tag.
    pub fn node_to_html(&self, id: NodeId) -> String {
        serialize::serialize_node(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_fragment() {
        let doc = Document::parse("<p>Hello <em>world</em></p><p>Again</p>").unwrap();
        assert_eq!(doc.to_html(), "<p>Hello <em>world</em></p><p>Again</p>");
        assert_eq!(doc.text_content(doc.root()), "Hello worldAgain");
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let doc = Document::parse("<p>one<br>two</p><p>three</p>").unwrap();
        let root = doc.root();
        assert_eq!(doc.children(root).len(), 2);
        assert_eq!(doc.to_html(), "<p>one<br/>two</p><p>three</p>");
    }

    #[test]
    fn entities_are_decoded_and_reescaped() {
        let doc = Document::parse("<p>a &amp; b&nbsp;c &#8220;q&#8221;</p>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "a & b\u{a0}c \u{201c}q\u{201d}");
        assert_eq!(doc.to_html(), "<p>a &amp; b\u{a0}c \u{201c}q\u{201d}</p>");
    }

    #[test]
    fn unmatched_end_tags_are_tolerated() {
        let doc = Document::parse("<div><p>text</div>tail</span>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "texttail");
    }

    #[test]
    fn unwrap_and_normalize_merge_text() {
        let mut doc = Document::parse("<p>ab<b>cd</b>ef</p>").unwrap();
        let p = doc.children(doc.root())[0];
        let b = doc.children(p)[1];
        doc.unwrap_element(b);
        doc.normalize(doc.root());
        assert_eq!(doc.children(p).len(), 1);
        assert_eq!(doc.to_html(), "<p>abcdef</p>");
    }

    #[test]
    fn descendants_are_in_document_order() {
        let doc = Document::parse("<p>a<i>b</i></p><p>c</p>").unwrap();
        let texts: Vec<&str> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|n| doc.text(n))
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn attributes_round_trip() {
        let mut doc = Document::parse(r#"<a href="x?a=1&amp;b=2" title='say "hi"'>link</a>"#).unwrap();
        let a = doc.children(doc.root())[0];
        assert_eq!(doc.attr(a, "href"), Some("x?a=1&b=2"));
        doc.set_attr(a, "class", "ext");
        assert_eq!(
            doc.to_html(),
            r#"<a href="x?a=1&amp;b=2" title="say &quot;hi&quot;" class="ext">link</a>"#
        );
    }

    #[test]
    fn compact_drops_detached_nodes() {
        let mut doc = Document::parse("<p>a<i>b</i></p><p>c</p>").unwrap();
        let italic = doc.children(doc.children(doc.root())[0])[1];
        doc.detach(italic);
        doc.create_text("stray");
        assert_eq!(doc.arena_len(), 8);

        doc.compact();

        assert_eq!(doc.arena_len(), 5);
        assert_eq!(doc.to_html(), "<p>a</p><p>c</p>");
        let first = doc.children(doc.root())[0];
        assert_eq!(doc.parent(first), Some(doc.root()));
    }
}
