//! Tree-sitter based parser adapter.
//!
//! Parses Python source with `tree-sitter-python` and lowers the result into
//! a [`SyntaxTree`] arena using a `TreeCursor`, so lowering is iterative.

use thiserror::Error;
use tree_sitter::{Language, Parser as TsParser, Tree};

use super::{NodeData, NodeId, Span, SyntaxTree};

/// Errors from the parser adapter.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to load grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("parser returned no tree")]
    NoTree,
}

/// The tree-sitter Python grammar.
pub fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Parse Python source into a syntax tree.
///
/// Syntax errors do not fail the parse; they surface as ERROR nodes and
/// [`SyntaxTree::has_errors`].
pub fn parse_python(source: &str) -> Result<SyntaxTree, ParseError> {
    let mut parser = TsParser::new();
    parser.set_language(&python_language())?;
    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    Ok(lower(&tree, source))
}

/// Lower a tree-sitter tree into an arena.
pub fn lower(tree: &Tree, source: &str) -> SyntaxTree {
    let mut nodes: Vec<NodeData> = Vec::new();
    let mut ancestors: Vec<NodeId> = Vec::new();
    let mut cursor = tree.walk();

    loop {
        let node = cursor.node();
        let id = nodes.len();
        let parent = ancestors.last().copied();
        nodes.push(NodeData {
            kind: node.kind(),
            field: cursor.field_name(),
            named: node.is_named(),
            extra: node.is_extra(),
            error: node.is_error() || node.is_missing(),
            parent,
            children: Vec::new(),
            span: span_of(&node),
        });
        if let Some(parent) = parent {
            nodes[parent].children.push(id);
        }

        if cursor.goto_first_child() {
            ancestors.push(id);
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return SyntaxTree::from_parts(source.to_string(), nodes);
            }
            ancestors.pop();
        }
    }
}

fn span_of(node: &tree_sitter::Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: start.row + 1, // tree-sitter is 0-indexed
        start_col: start.column + 1,
        end_line: end.row + 1,
        end_col: end.column + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowering_preserves_structure() {
        let tree = parse_python("import os\n\ndef f(x):\n    return x\n").unwrap();
        let root = tree.root();
        assert_eq!(root.kind(), "module");
        let kinds: Vec<_> = root.named_children().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["import_statement", "function_definition"]);

        let func = root.named_child(1).unwrap();
        assert_eq!(func.child_by_field("name").unwrap().text(), "f");
        assert_eq!(func.span().start_line, 3);
    }

    #[test]
    fn test_async_token_is_kept() {
        let tree = parse_python("async def f():\n    pass\n").unwrap();
        let func = tree.root().named_child(0).unwrap();
        assert_eq!(func.kind(), "function_definition");
        assert!(func.has_token("async"));
    }

    #[test]
    fn test_syntax_errors_are_flagged() {
        let tree = parse_python("def broken(:\n").unwrap();
        assert!(tree.has_errors());
        let ok = parse_python("x = 1\n").unwrap();
        assert!(!ok.has_errors());
    }

    #[test]
    fn test_comments_are_extras() {
        let tree = parse_python("x = 1  # note\n").unwrap();
        let comment = tree
            .root()
            .descendants()
            .find(|n| n.kind() == "comment")
            .unwrap();
        assert!(comment.is_extra());
        assert!(tree.root().named_children().all(|n| n.kind() != "comment"));
    }
}
