//! Language-specific analyzer implementations.

pub mod python;

pub use python::{Catalog, PythonAnalyzer};

use super::LanguageAnalyzer;
use once_cell::sync::OnceCell;

/// Static storage for the Python analyzer over the built-in catalog.
static PYTHON_ANALYZER: OnceCell<PythonAnalyzer> = OnceCell::new();

/// Register all available language analyzers.
///
/// This is idempotent - calling it multiple times is safe.
pub fn register_analyzers() {
    PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new);
}

/// Get an analyzer for the given file extension.
///
/// Returns None if no analyzer is registered for the extension.
pub fn get_analyzer(ext: &str) -> Option<&'static dyn LanguageAnalyzer> {
    register_analyzers();

    match ext {
        "py" | "pyi" => PYTHON_ANALYZER.get().map(|a| a as &'static dyn LanguageAnalyzer),
        _ => None,
    }
}

/// Get all registered file extensions.
pub fn registered_extensions() -> Vec<String> {
    vec!["py".to_string(), "pyi".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_extension() {
        assert_eq!(get_analyzer("py").map(|a| a.language_id()), Some("python"));
        assert!(get_analyzer("pyi").is_some());
        assert!(get_analyzer("go").is_none());
        assert!(registered_extensions().contains(&"py".to_string()));
    }
}
