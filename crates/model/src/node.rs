//! Arena-backed document model.
//!
//! A [`Document`] owns all of its nodes in one `Vec`; a [`NodeRef`] is a
//! cheap handle of (document, index). Parent and child links are indices
//! into the arena, so the whole tree is `Send + Sync` and a handle can be
//! stored in a context or a deferred tail call without lifetime ties to a
//! borrowed parse tree.
//!
//! Documents are built programmatically with [`DocumentBuilder`]; parsing
//! XML into this model is a front-end concern outside this crate.

use std::fmt;
use std::sync::Arc;

use crate::name::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    name: Option<QName>,
    value: String,
    parent: Option<usize>,
    children: Vec<usize>,
    attributes: Vec<usize>,
}

/// A complete document tree. Index 0 is always the document node.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn root(self: &Arc<Self>) -> NodeRef {
        NodeRef {
            doc: Arc::clone(self),
            id: 0,
        }
    }
}

/// A handle to one node of a [`Document`].
#[derive(Clone)]
pub struct NodeRef {
    doc: Arc<Document>,
    id: usize,
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data();
        write!(f, "NodeRef#{}({:?}", self.id, data.kind)?;
        if let Some(name) = &data.name {
            write!(f, " {}", name)?;
        }
        write!(f, ")")
    }
}

impl NodeRef {
    fn data(&self) -> &NodeData {
        &self.doc.nodes[self.id]
    }

    fn at(&self, id: usize) -> NodeRef {
        NodeRef {
            doc: Arc::clone(&self.doc),
            id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    pub fn name(&self) -> Option<&QName> {
        self.data().name.as_ref()
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.data().parent.map(|id| self.at(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.data().children.iter().map(|&id| self.at(id))
    }

    pub fn attributes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.data().attributes.iter().map(|&id| self.at(id))
    }

    pub fn document_root(&self) -> NodeRef {
        self.at(0)
    }

    /// The XDM string value: for documents and elements the concatenation
    /// of all descendant text, otherwise the node's own value.
    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(&mut out);
                out
            }
            _ => self.data().value.clone(),
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in self.children() {
            match child.kind() {
                NodeKind::Text => out.push_str(&child.data().value),
                NodeKind::Element => child.collect_text(out),
                _ => {}
            }
        }
    }
}

/// Push/pop builder for document trees.
pub struct DocumentBuilder {
    nodes: Vec<NodeData>,
    stack: Vec<usize>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                name: None,
                value: String::new(),
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
            }],
            stack: vec![0],
        }
    }

    fn current(&self) -> usize {
        *self.stack.last().expect("builder stack underflow")
    }

    fn push_node(&mut self, kind: NodeKind, name: Option<QName>, value: String) -> usize {
        let parent = self.current();
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind,
            name,
            value,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
        });
        id
    }

    pub fn start_element(&mut self, name: QName) -> &mut Self {
        let id = self.push_node(NodeKind::Element, Some(name), String::new());
        let parent = self.current();
        self.nodes[parent].children.push(id);
        self.stack.push(id);
        self
    }

    pub fn end_element(&mut self) -> &mut Self {
        debug_assert!(self.stack.len() > 1, "end_element without start_element");
        self.stack.pop();
        self
    }

    pub fn attribute(&mut self, name: QName, value: impl Into<String>) -> &mut Self {
        let id = self.push_node(NodeKind::Attribute, Some(name), value.into());
        let parent = self.current();
        self.nodes[parent].attributes.push(id);
        self
    }

    pub fn text(&mut self, value: impl Into<String>) -> &mut Self {
        let id = self.push_node(NodeKind::Text, None, value.into());
        let parent = self.current();
        self.nodes[parent].children.push(id);
        self
    }

    pub fn comment(&mut self, value: impl Into<String>) -> &mut Self {
        let id = self.push_node(NodeKind::Comment, None, value.into());
        let parent = self.current();
        self.nodes[parent].children.push(id);
        self
    }

    pub fn processing_instruction(
        &mut self,
        target: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let id = self.push_node(
            NodeKind::ProcessingInstruction,
            Some(QName::local(target)),
            value.into(),
        );
        let parent = self.current();
        self.nodes[parent].children.push(id);
        self
    }

    pub fn namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> &mut Self {
        let id = self.push_node(
            NodeKind::Namespace,
            Some(QName::local(prefix)),
            uri.into(),
        );
        let parent = self.current();
        self.nodes[parent].attributes.push(id);
        self
    }

    /// Finishes the tree and returns the document node.
    pub fn build(self) -> NodeRef {
        let doc = Arc::new(Document { nodes: self.nodes });
        doc.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeRef {
        let mut b = DocumentBuilder::new();
        b.start_element(QName::local("root"))
            .attribute(QName::local("id"), "r1")
            .text("a")
            .start_element(QName::local("child"))
            .text("b")
            .end_element()
            .comment("ignored")
            .text("c")
            .end_element();
        b.build()
    }

    #[test]
    fn string_value_concatenates_descendant_text() {
        let root = sample();
        assert_eq!(root.string_value(), "abc");
        let elem = root.children().next().unwrap();
        assert_eq!(elem.string_value(), "abc");
    }

    #[test]
    fn attributes_are_not_children() {
        let root = sample();
        let elem = root.children().next().unwrap();
        assert_eq!(elem.children().count(), 4);
        let attr = elem.attributes().next().unwrap();
        assert_eq!(attr.kind(), NodeKind::Attribute);
        assert_eq!(attr.string_value(), "r1");
    }

    #[test]
    fn parent_links_and_identity() {
        let root = sample();
        let elem = root.children().next().unwrap();
        let child = elem.children().nth(1).unwrap();
        assert_eq!(child.parent(), Some(elem.clone()));
        assert_eq!(child.document_root(), root);
        assert_ne!(child, elem);
    }
}
