//! Python language analyzer.
//!
//! Each file goes through one resolver pre-pass ([`bindings`]) and then one
//! traversal per extractor:
//! - [`calls`]: outbound HTTP requests
//! - [`routes`]: FastAPI/Flask routes, groups and include edges
//! - [`schemas`]: every class declaration, for the unit-level model pass
//! - [`tools`]: MCP tool, resource and prompt signatures

mod annotations;
mod bindings;
mod calls;
pub mod catalog;
mod docstring;
mod routes;
mod schemas;
mod tools;
mod values;

use anyhow::Context;
use tracing::debug;

use crate::analysis::{FileFacts, LanguageAnalyzer, ParsedFile};
use crate::parser::{parse_python, SyntaxTree};

pub use annotations::MAX_TYPE_DEPTH;
pub use catalog::Catalog;

use annotations::Normalizer;
use bindings::BindingTable;

/// Everything an extractor needs to look at one file.
pub struct FileContext<'a> {
    pub file: &'a str,
    pub tree: &'a SyntaxTree,
    pub table: &'a BindingTable,
    pub catalog: &'a Catalog,
}

impl<'a> FileContext<'a> {
    pub fn normalizer(&self) -> Normalizer<'a> {
        Normalizer::new(self.tree, self.table)
    }
}

/// Python analyzer over a recognition catalog.
#[derive(Debug, Clone, Default)]
pub struct PythonAnalyzer {
    catalog: Catalog,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzer whose catalog carries project-specific additions.
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parse and extract in one step.
    pub fn analyze_source(
        &self,
        path: &str,
        module: Option<&str>,
        source: &str,
    ) -> anyhow::Result<FileFacts> {
        let parsed = self
            .parse(path, source)?
            .with_module(module.map(str::to_string));
        Ok(self.extract_facts(&parsed))
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn file_globs(&self) -> &'static [&'static str] {
        &["**/*.py", "**/*.pyi"]
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, path: &str, source: &str) -> anyhow::Result<ParsedFile> {
        let tree = parse_python(source).with_context(|| format!("failed to parse {}", path))?;
        Ok(ParsedFile::new(tree, path))
    }

    fn extract_facts(&self, parsed: &ParsedFile) -> FileFacts {
        let table = BindingTable::build(&parsed.tree, &self.catalog);
        let cx = FileContext {
            file: &parsed.path,
            tree: &parsed.tree,
            table: &table,
            catalog: &self.catalog,
        };

        let routes = routes::extract(&cx);
        let mut facts = FileFacts::empty(&parsed.path, self.language_id());
        facts.module = parsed.module.clone();
        facts.http_calls = calls::extract(&cx);
        facts.routes = routes.routes;
        facts.groups = routes.groups;
        facts.includes = routes.includes;
        facts.classes = schemas::extract(&cx);
        facts.tools = tools::extract(&cx);
        facts.has_parse_errors = parsed.tree.has_errors();

        debug!(
            file = %parsed.path,
            calls = facts.http_calls.len(),
            routes = facts.routes.len(),
            classes = facts.classes.len(),
            tools = facts.tools.len(),
            "extracted file facts"
        );
        facts
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Parse `source` as `test.py` and run `f` against its context.
    pub fn with_context<T>(source: &str, f: impl FnOnce(&FileContext<'_>) -> T) -> T {
        let tree = parse_python(source).unwrap();
        let catalog = Catalog::builtin();
        let table = BindingTable::build(&tree, &catalog);
        let cx = FileContext {
            file: "test.py",
            tree: &tree,
            table: &table,
            catalog: &catalog,
        };
        f(&cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::facts::{GroupKind, SchemaKind};
    use catalog::Role;

    const SERVICE: &str = r#"
import httpx
from fastapi import APIRouter
from pydantic import BaseModel

router = APIRouter(prefix="/users")

class User(BaseModel):
    id: int
    name: str

@router.get("/{user_id}", response_model=User)
async def read_user(user_id: int):
    async with httpx.AsyncClient() as client:
        r = await client.get(f"https://auth/{user_id}")
    return r.json()
"#;

    #[test]
    fn test_extract_facts() {
        let analyzer = PythonAnalyzer::new();
        let facts = analyzer
            .analyze_source("svc/users.py", Some("svc.users"), SERVICE)
            .unwrap();

        assert_eq!(facts.language, "python");
        assert_eq!(facts.module.as_deref(), Some("svc.users"));
        assert_eq!(facts.http_calls.len(), 1);
        assert_eq!(facts.routes.len(), 1);
        assert_eq!(facts.groups.len(), 1);
        assert_eq!(facts.groups[0].kind, GroupKind::Router);
        assert_eq!(facts.classes.len(), 1);
        assert_eq!(facts.classes[0].direct_kind, Some(SchemaKind::Pydantic));
        assert!(facts.tools.is_empty());
        assert!(!facts.has_parse_errors);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let analyzer = PythonAnalyzer::new();
        let first = analyzer.analyze_source("a.py", None, SERVICE).unwrap();
        let second = analyzer.analyze_source("a.py", None, SERVICE).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_aliased_groups_extract_deterministically() {
        let source = "from fastapi import APIRouter\nrouter = APIRouter(prefix='/a')\nalias = router\nother = alias\n@router.get('/x')\ndef x():\n    pass\n";
        let analyzer = PythonAnalyzer::new();
        let first = analyzer.analyze_source("a.py", None, source).unwrap();
        assert_eq!(first.groups.len(), 1);
        assert_eq!(first.groups[0].key.name, "router");
        let expected = serde_json::to_string(&first).unwrap();
        for _ in 0..32 {
            let again = analyzer.analyze_source("a.py", None, source).unwrap();
            assert_eq!(serde_json::to_string(&again).unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_errors_are_flagged() {
        let analyzer = PythonAnalyzer::new();
        let facts = analyzer
            .analyze_source("broken.py", None, "def broken(:\n    requests.get('/x')\n")
            .unwrap();
        assert!(facts.has_parse_errors);
    }

    #[test]
    fn test_custom_catalog_constructor() {
        let mut catalog = Catalog::builtin();
        catalog.add_constructor(
            "internal.http.ApiClient",
            Role::HttpClient {
                library: "internal".into(),
                is_async: false,
            },
        );
        let source = "from internal.http import ApiClient\napi = ApiClient()\napi.post('/jobs')\n";

        let plain = PythonAnalyzer::new()
            .analyze_source("jobs.py", None, source)
            .unwrap();
        assert!(plain.http_calls.is_empty());

        let custom = PythonAnalyzer::with_catalog(catalog)
            .analyze_source("jobs.py", None, source)
            .unwrap();
        assert_eq!(custom.http_calls.len(), 1);
        assert_eq!(custom.http_calls[0].library, "internal");
    }
}
