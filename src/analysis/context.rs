//! Analysis context for caching extracted facts.
//!
//! The AnalysisContext provides:
//! - File I/O and module naming around the pure extractors
//! - Caching of extracted facts
//! - Parallel or sequential pass 1 over a file list

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::Context;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::analysis::{
    get_analyzer, resolve_unit, FileFacts, LanguageAnalyzer, PythonAnalyzer, UnitFacts,
};

/// Analysis context for a set of files.
pub struct AnalysisContext {
    /// Base directory for relative path resolution.
    base_dir: PathBuf,
    /// Analyzer with a project catalog, used instead of the registry default.
    analyzer: Option<PythonAnalyzer>,
    /// Cached file facts, keyed by absolute path.
    facts_cache: RwLock<HashMap<PathBuf, FileFacts>>,
}

/// Dotted module name of a path relative to the scan root.
///
/// `app/routers/items.py` is `app.routers.items`; a package's `__init__.py`
/// names the package itself.
pub fn module_name(relative: &Path) -> Option<String> {
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    let last = parts.pop()?;
    let stem = Path::new(&last).file_stem()?.to_string_lossy().to_string();
    if stem != "__init__" {
        parts.push(stem);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

impl AnalysisContext {
    /// Create a new analysis context.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            analyzer: None,
            facts_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Use `analyzer` for the files it handles.
    pub fn with_analyzer(mut self, analyzer: PythonAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn analyzer_for(&self, ext: &str) -> Option<&dyn LanguageAnalyzer> {
        match &self.analyzer {
            Some(custom) if custom.handles_extension(ext) => Some(custom as &dyn LanguageAnalyzer),
            _ => get_analyzer(ext),
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn relative<'p>(&self, abs_path: &'p Path) -> &'p Path {
        abs_path.strip_prefix(&self.base_dir).unwrap_or(abs_path)
    }

    /// Analyze a file and cache the results.
    ///
    /// Returns cached facts if already analyzed.
    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<FileFacts> {
        let abs_path = self.absolute(path.as_ref());

        {
            let cache = self.facts_cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(facts) = cache.get(&abs_path) {
                return Ok(facts.clone());
            }
        }

        let relative = self.relative(&abs_path);
        let rel_path = relative.to_string_lossy().to_string();
        let ext = abs_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let Some(analyzer) = self.analyzer_for(ext) else {
            return Ok(FileFacts::empty(&rel_path, "unknown"));
        };

        let source = fs::read_to_string(&abs_path)
            .with_context(|| format!("failed to read {}", abs_path.display()))?;
        let parsed = analyzer
            .parse(&rel_path, &source)?
            .with_module(module_name(relative));
        let facts = analyzer.extract_facts(&parsed);
        debug!(file = %rel_path, facts = facts.fact_count(), "analyzed file");

        {
            let mut cache = self.facts_cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.insert(abs_path, facts.clone());
        }

        Ok(facts)
    }

    /// Pass 1 over many files.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    /// Results are sorted by path either way.
    pub fn analyze_files(&self, paths: &[PathBuf], parallel: bool) -> Vec<FileFacts> {
        let results: Vec<_> = if parallel {
            paths.par_iter().map(|p| (p, self.analyze_file(p))).collect()
        } else {
            paths.iter().map(|p| (p, self.analyze_file(p))).collect()
        };

        let mut all_facts = Vec::new();
        for (path, result) in results {
            match result {
                Ok(facts) => all_facts.push(facts),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping file"),
            }
        }

        all_facts.sort_by(|a, b| a.path.cmp(&b.path));
        all_facts
    }

    /// Both passes over a file list.
    pub fn analyze_unit(&self, paths: &[PathBuf], parallel: bool) -> UnitFacts {
        let files = self.analyze_files(paths, parallel);
        resolve_unit(files, parallel)
    }

    /// Get cached facts for a file.
    ///
    /// Returns None if the file hasn't been analyzed yet.
    pub fn facts_for_file<P: AsRef<Path>>(&self, path: P) -> Option<FileFacts> {
        let abs_path = self.absolute(path.as_ref());
        let cache = self.facts_cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(&abs_path).cloned()
    }

    /// Get all analyzed file paths.
    pub fn analyzed_files(&self) -> Vec<String> {
        let cache = self.facts_cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut files: Vec<_> = cache.values().map(|f| f.path.clone()).collect();
        files.sort();
        files
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        let mut cache = self.facts_cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("app/routers/items.py")).as_deref(), Some("app.routers.items"));
        assert_eq!(module_name(Path::new("app/__init__.py")).as_deref(), Some("app"));
        assert_eq!(module_name(Path::new("main.py")).as_deref(), Some("main"));
        assert_eq!(module_name(Path::new("__init__.py")), None);
    }

    #[test]
    fn test_analyze_python_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("svc")).unwrap();
        let file_path = temp.path().join("svc/client.py");
        fs::write(&file_path, "import requests\n\nrequests.get('https://example.com')\n").unwrap();

        let ctx = AnalysisContext::new(temp.path());
        let facts = ctx.analyze_file(&file_path).unwrap();

        assert_eq!(facts.language, "python");
        assert_eq!(facts.path, Path::new("svc").join("client.py").to_string_lossy());
        assert_eq!(facts.module.as_deref(), Some("svc.client"));
        assert_eq!(facts.http_calls.len(), 1);
    }

    #[test]
    fn test_caching() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("main.py");
        fs::write(&file_path, "import httpx\nhttpx.post('/x')\n").unwrap();

        let ctx = AnalysisContext::new(temp.path());
        let first = ctx.analyze_file(&file_path).unwrap();
        assert!(ctx.facts_for_file("main.py").is_some());
        let second = ctx.analyze_file(&file_path).unwrap();
        assert_eq!(first.http_calls, second.http_calls);
        assert_eq!(ctx.analyzed_files(), vec!["main.py".to_string()]);

        ctx.clear_cache();
        assert!(ctx.facts_for_file("main.py").is_none());
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, "requests.get('/x')").unwrap();

        let ctx = AnalysisContext::new(temp.path());
        assert_eq!(ctx.analyze_file(&notes).unwrap().language, "unknown");

        let facts = ctx.analyze_files(&[temp.path().join("missing.py"), notes], false);
        assert_eq!(facts.len(), 1);
    }
}
