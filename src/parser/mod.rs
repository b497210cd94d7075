//! Generic syntax tree consumed by the extractors.
//!
//! This module provides:
//! - `SyntaxTree`: an arena of nodes that owns its source text
//! - `Node`: a cheap copyable handle with a tree-sitter-like API
//! - `Descendants`: explicit-stack pre-order traversal
//! - Tree-sitter lowering for Python (see [`treesitter`])
//!
//! The extractors never see tree-sitter types directly. Trees are flat
//! vectors, so building, walking and dropping them never recurses no matter
//! how deeply the source nests.

use std::fmt;

use serde::Serialize;

pub mod treesitter;

pub use treesitter::{parse_python, ParseError};

/// Index of a node inside its tree's arena.
pub type NodeId = usize;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    /// Whether `byte` falls inside this span.
    pub fn contains(&self, byte: usize) -> bool {
        self.start_byte <= byte && byte < self.end_byte
    }

    /// Whether `other` lies completely inside this span.
    pub fn encloses(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Grammar kind (`call`, `identifier`, `(`...).
    pub kind: &'static str,
    /// Field name relative to the parent, if the grammar assigns one.
    pub field: Option<&'static str>,
    /// Named nodes are grammar rules; anonymous ones are tokens.
    pub named: bool,
    /// Extras (comments) may appear anywhere.
    pub extra: bool,
    /// ERROR or MISSING node.
    pub error: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Span,
}

/// An immutable syntax tree. Node 0 is the root.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<NodeData>,
}

impl SyntaxTree {
    /// Assemble a tree from its source and an arena whose first entry is the root.
    pub fn from_parts(source: String, nodes: Vec<NodeData>) -> Self {
        Self { source, nodes }
    }

    pub fn root(&self) -> Node<'_> {
        Node { tree: self, id: 0 }
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        debug_assert!(id < self.nodes.len());
        Node { tree: self, id }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the parser had to recover from syntax errors anywhere.
    pub fn has_errors(&self) -> bool {
        self.nodes.iter().any(|n| n.error)
    }
}

/// Handle to a node inside a [`SyntaxTree`].
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl<'t> Node<'t> {
    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    pub fn kind(&self) -> &'static str {
        self.data().kind
    }

    pub fn field(&self) -> Option<&'static str> {
        self.data().field
    }

    pub fn is_named(&self) -> bool {
        self.data().named
    }

    pub fn is_extra(&self) -> bool {
        self.data().extra
    }

    pub fn span(&self) -> Span {
        self.data().span
    }

    pub fn start_byte(&self) -> usize {
        self.data().span.start_byte
    }

    pub fn end_byte(&self) -> usize {
        self.data().span.end_byte
    }

    /// Source text covered by this node.
    pub fn text(&self) -> &'t str {
        let span = self.data().span;
        self.tree
            .source
            .get(span.start_byte..span.end_byte)
            .unwrap_or("")
    }

    pub fn parent(&self) -> Option<Node<'t>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    /// All children, tokens and extras included.
    pub fn children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| tree.node(id))
    }

    /// Named, non-extra children in source order.
    pub fn named_children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        self.children().filter(|c| c.is_named() && !c.is_extra())
    }

    pub fn named_child(&self, index: usize) -> Option<Node<'t>> {
        self.named_children().nth(index)
    }

    pub fn child_by_field(&self, field: &str) -> Option<Node<'t>> {
        self.children().find(|c| c.field() == Some(field))
    }

    pub fn children_by_field<'f>(&self, field: &'f str) -> impl Iterator<Item = Node<'t>> + 'f
    where
        't: 'f,
    {
        self.children().filter(move |c| c.field() == Some(field))
    }

    /// Whether an anonymous token of this kind is a direct child (`async`, `|`).
    pub fn has_token(&self, token: &str) -> bool {
        self.children().any(|c| !c.is_named() && c.kind() == token)
    }

    /// Pre-order traversal of this node and everything below it.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            stack: vec![self.id],
        }
    }

    /// Nearest ancestor (excluding self) of the given kind.
    pub fn ancestor(&self, kind: &str) -> Option<Node<'t>> {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.kind() == kind {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.kind(), self.id, self.span())
    }
}

/// Explicit-stack pre-order iterator over a subtree.
pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let data = &self.tree.nodes[id];
        self.stack.extend(data.children.iter().rev().copied());
        Some(self.tree.node(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_are_in_source_order() {
        let tree = parse_python("a = 1\nb = 2\n").unwrap();
        let idents: Vec<_> = tree
            .root()
            .descendants()
            .filter(|n| n.kind() == "identifier")
            .map(|n| n.text())
            .collect();
        assert_eq!(idents, vec!["a", "b"]);
    }

    #[test]
    fn test_field_lookup() {
        let tree = parse_python("x = foo(1)\n").unwrap();
        let call = tree
            .root()
            .descendants()
            .find(|n| n.kind() == "call")
            .unwrap();
        assert_eq!(call.child_by_field("function").unwrap().text(), "foo");
        assert_eq!(call.child_by_field("arguments").unwrap().text(), "(1)");
        assert_eq!(call.parent().unwrap().kind(), "assignment");
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let depth = 2_000;
        let source = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let tree = parse_python(&source).unwrap();
        assert!(tree.root().descendants().count() > depth);
        drop(tree);
    }

    #[test]
    fn test_span_display() {
        let span = Span {
            start_line: 3,
            start_col: 5,
            ..Span::default()
        };
        assert_eq!(span.to_string(), "3:5");
    }
}
