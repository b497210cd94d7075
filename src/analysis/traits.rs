//! Core traits for language analysis.

use crate::parser::SyntaxTree;

use super::FileFacts;

/// A parsed source file plus the labels the host attaches to it.
///
/// This is kept separate from FileFacts so a tree can be handed to the
/// extractors without re-parsing.
pub struct ParsedFile {
    /// The lowered syntax tree (owns the source text).
    pub tree: SyntaxTree,
    /// File label carried onto every fact.
    pub path: String,
    /// Dotted module name, used only for import matching across files.
    pub module: Option<String>,
}

impl ParsedFile {
    pub fn new(tree: SyntaxTree, path: impl Into<String>) -> Self {
        Self {
            tree,
            path: path.into(),
            module: None,
        }
    }

    pub fn with_module(mut self, module: Option<String>) -> Self {
        self.module = module;
        self
    }

    /// Get the source code as a string slice.
    pub fn source_str(&self) -> &str {
        self.tree.source()
    }
}

/// Language-specific analyzer trait.
///
/// Python is the only implementation today; the trait keeps the host layers
/// independent of it.
pub trait LanguageAnalyzer: Send + Sync {
    /// Returns the language identifier (e.g., "python").
    fn language_id(&self) -> &'static str;

    /// Returns glob patterns for files this analyzer handles.
    fn file_globs(&self) -> &'static [&'static str];

    /// Returns file extensions this analyzer handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse a source file.
    ///
    /// Syntax errors still produce a tree; only a parser failure is an error.
    fn parse(&self, path: &str, source: &str) -> anyhow::Result<ParsedFile>;

    /// Extract all pass-1 facts from a parsed file.
    ///
    /// Extraction never fails: anything it cannot classify degrades to an
    /// unknown value inside an otherwise complete fact.
    fn extract_facts(&self, parsed: &ParsedFile) -> FileFacts;

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
