//! apiscan - static API surface extraction for Python.
//!
//! apiscan reads Python sources without executing them and extracts
//! "facts" about the API surface they touch or expose: outbound HTTP
//! calls, inbound routes with their router/blueprint prefixes, data
//! schemas and MCP tool signatures.
//!
//! # Architecture
//!
//! The codebase uses tree-sitter for AST-based analysis:
//!
//! - `parser`: tree-sitter adapter producing an owned syntax tree
//! - `analysis`: per-file extractors and the cross-file resolution pass
//! - `config`: YAML configuration and catalog extensions
//! - `report`: Output formatting (pretty, JSON)
//!
//! # Example
//!
//! ```no_run
//! use apiscan::{AnalysisContext, PythonAnalyzer};
//! use std::path::PathBuf;
//!
//! let ctx = AnalysisContext::new("service").with_analyzer(PythonAnalyzer::new());
//! let unit = ctx.analyze_unit(&[PathBuf::from("service/app/main.py")], true);
//! for route in &unit.routes {
//!     println!("{:?} {:?}", route.methods, route.effective_path);
//! }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod parser;
pub mod report;

pub use analysis::{
    register_analyzers, resolve_unit, AnalysisContext, Catalog, FileFacts, HttpCallFact,
    LanguageAnalyzer, PythonAnalyzer, RouteFact, RouteGroupFact, SchemaFact, ToolSignatureFact,
    UnitFacts,
};
pub use config::{Config, ConfigError};
pub use parser::{parse_python, ParseError, SyntaxTree};

/// Initialize all subsystems.
///
/// Call this once at startup.
pub fn init() {
    register_analyzers();
}
