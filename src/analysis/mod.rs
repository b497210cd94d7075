//! AST-backed fact extraction.
//!
//! Language analyzers lower each source file into a [`SyntaxTree`] and
//! extract "facts" from it:
//! - outbound HTTP calls ([`HttpCallFact`])
//! - inbound routes and their groups ([`RouteFact`], [`RouteGroupFact`])
//! - data schemas ([`SchemaFact`])
//! - tool signatures ([`ToolSignatureFact`])
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Source Files │────▶│ Analyzer     │────▶│ FileFacts     │  pass 1
//! └──────────────┘     │ (per file)   │     │ (per file)    │  (parallel)
//!                      └──────────────┘     └───────────────┘
//!                                                   │
//!                                                   ▼
//!                      ┌──────────────┐     ┌───────────────┐
//!                      │ UnitFacts    │◀────│ GroupIndex +  │  pass 2
//!                      │ (ordered)    │     │ class index   │
//!                      └──────────────┘     └───────────────┘
//! ```
//!
//! The extractors never touch the filesystem; [`AnalysisContext`] does the
//! I/O and caching around them.
//!
//! [`SyntaxTree`]: crate::parser::SyntaxTree

mod context;
pub mod facts;
pub mod groups;
pub mod languages;
mod traits;
pub mod types;
mod unit;

pub use context::AnalysisContext;
pub use facts::{
    Degradation, FileFacts, Framework, GroupInclude, GroupKey, HttpCallFact, HttpMethod,
    RouteFact, RouteGroupFact, SchemaFact, Span, ToolSignatureFact, UrlExpression,
};
pub use groups::{join_paths, GroupIndex};
pub use languages::python::catalog::Role;
pub use languages::{
    get_analyzer, register_analyzers, registered_extensions, Catalog, PythonAnalyzer,
};
pub use traits::{LanguageAnalyzer, ParsedFile};
pub use types::{TypeDescriptor, TypeInfo};
pub use unit::{resolve_unit, FileSummary, UnitFacts};
