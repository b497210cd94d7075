//! Unit-level orchestration: the barrier between pass 1 and pass 2.
//!
//! Pass 1 (per file, see [`LanguageAnalyzer::extract_facts`]) produces
//! independent [`FileFacts`]. [`resolve_unit`] freezes the group index,
//! resolves effective route paths in parallel, recognizes models across
//! files and merges inherited fields.
//!
//! [`LanguageAnalyzer::extract_facts`]: super::LanguageAnalyzer::extract_facts

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::facts::{
    BaseRef, ClassDecl, Degradation, FileFacts, GroupInclude, GroupStatus, HttpCallFact,
    RouteFact, RouteGroupFact, SchemaFact, SchemaField, SchemaKind, ToolSignatureFact,
};
use super::groups::{absolute_module, module_matches, GroupIndex};

/// Per-file bookkeeping carried into the unit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub has_parse_errors: bool,
}

/// Every fact of an analyzed unit, ordered by (file, span).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitFacts {
    pub http_calls: Vec<HttpCallFact>,
    pub routes: Vec<RouteFact>,
    pub groups: Vec<RouteGroupFact>,
    pub unresolved_includes: Vec<GroupInclude>,
    pub schemas: Vec<SchemaFact>,
    pub tools: Vec<ToolSignatureFact>,
    pub files: Vec<FileSummary>,
}

impl UnitFacts {
    pub fn fact_count(&self) -> usize {
        self.http_calls.len() + self.routes.len() + self.schemas.len() + self.tools.len()
    }

    /// Facts carrying at least one degradation flag.
    pub fn degraded_count(&self) -> usize {
        self.http_calls.iter().filter(|f| !f.degradations.is_empty()).count()
            + self.routes.iter().filter(|f| !f.degradations.is_empty()).count()
            + self.schemas.iter().filter(|f| !f.degradations.is_empty()).count()
            + self.tools.iter().filter(|f| !f.degradations.is_empty()).count()
    }

    pub fn parse_error_count(&self) -> usize {
        self.files.iter().filter(|f| f.has_parse_errors).count()
    }
}

/// Resolve pass-2 facts for a set of files.
///
/// `parallel = false` runs every step on the calling thread and produces the
/// same output.
pub fn resolve_unit(mut files: Vec<FileFacts>, parallel: bool) -> UnitFacts {
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let index = GroupIndex::build(&files);
    debug!(
        groups = index.groups().len(),
        unresolved = index.unresolved().len(),
        "group index frozen"
    );

    let resolve_routes = |facts: &FileFacts| -> Vec<RouteFact> {
        facts
            .routes
            .iter()
            .map(|route| {
                let mut route = route.clone();
                route.effective_path = index.effective_path(&route);
                let cyclic = route
                    .group
                    .as_ref()
                    .and_then(|key| index.group(key))
                    .map(|g| g.status == GroupStatus::Cyclic)
                    .unwrap_or(false);
                if cyclic {
                    route.degradations.insert(Degradation::UnresolvedGroup);
                }
                route
            })
            .collect()
    };
    let mut routes: Vec<RouteFact> = if parallel {
        files.par_iter().flat_map_iter(resolve_routes).collect()
    } else {
        files.iter().flat_map(resolve_routes).collect()
    };
    routes.sort_by(|a, b| (&a.file, a.span).cmp(&(&b.file, b.span)));

    let schemas = SchemaResolver::new(&files).resolve();

    let mut http_calls: Vec<HttpCallFact> =
        files.iter().flat_map(|f| f.http_calls.iter().cloned()).collect();
    http_calls.sort_by(|a, b| (&a.file, a.span).cmp(&(&b.file, b.span)));
    let mut tools: Vec<ToolSignatureFact> =
        files.iter().flat_map(|f| f.tools.iter().cloned()).collect();
    tools.sort_by(|a, b| (&a.file, a.span).cmp(&(&b.file, b.span)));

    let summaries = files
        .iter()
        .map(|f| FileSummary {
            path: f.path.clone(),
            module: f.module.clone(),
            has_parse_errors: f.has_parse_errors,
        })
        .collect();

    let (mut groups, unresolved_includes) = index.into_parts();
    groups.sort_by(|a, b| (&a.key.file, a.span).cmp(&(&b.key.file, b.span)));

    UnitFacts {
        http_calls,
        routes,
        groups,
        unresolved_includes,
        schemas,
        tools,
        files: summaries,
    }
}

struct ClassEntry<'a> {
    file: &'a str,
    module: Option<&'a str>,
    decl: &'a ClassDecl,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Fresh,
    Open,
    Done,
}

/// Cross-file model recognition and field inheritance.
struct SchemaResolver<'a> {
    classes: Vec<ClassEntry<'a>>,
    by_name: HashMap<&'a str, Vec<usize>>,
    bases: Vec<Vec<usize>>,
}

impl<'a> SchemaResolver<'a> {
    fn new(files: &'a [FileFacts]) -> Self {
        let classes: Vec<ClassEntry<'a>> = files
            .iter()
            .flat_map(|f| {
                f.classes.iter().map(move |decl| ClassEntry {
                    file: &f.path,
                    module: f.module.as_deref(),
                    decl,
                })
            })
            .collect();
        let mut by_name: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, class) in classes.iter().enumerate() {
            by_name.entry(class.decl.name.as_str()).or_default().push(i);
        }

        let mut resolver = Self {
            classes,
            by_name,
            bases: Vec::new(),
        };
        resolver.bases = (0..resolver.classes.len())
            .map(|i| {
                resolver.classes[i]
                    .decl
                    .bases
                    .iter()
                    .filter_map(|base| resolver.find_base(i, base))
                    .collect()
            })
            .collect();
        resolver
    }

    /// Find the class a base reference names.
    fn find_base(&self, from: usize, base: &BaseRef) -> Option<usize> {
        let named = self.by_name.get(base.symbol.as_str())?;
        let here = &self.classes[from];
        let candidates: Vec<usize> = named.iter().copied().filter(|&i| i != from).collect();

        let picked = match &base.module {
            Some(module) => {
                let in_module = |wanted: &str| -> Option<usize> {
                    candidates.iter().copied().rev().find(|&i| {
                        self.classes[i]
                            .module
                            .map(|m| module_matches(m, wanted))
                            .unwrap_or(false)
                    })
                };
                absolute_module(here.module, module)
                    .and_then(|m| in_module(&m))
                    .or_else(|| in_module(module.trim_start_matches('.')))
            }
            // Same file first: the last declaration before the subclass.
            None => candidates
                .iter()
                .copied()
                .filter(|&i| self.classes[i].file == here.file)
                .filter(|&i| self.classes[i].decl.span.start_byte < here.decl.span.start_byte)
                .last(),
        };
        picked.or_else(|| match candidates.as_slice() {
            [only] => Some(*only),
            _ => None,
        })
    }

    /// Model kind of every class, direct or through recognized bases.
    fn recognize(&self) -> (Vec<Option<SchemaKind>>, Vec<bool>) {
        let mut kinds: Vec<Option<SchemaKind>> =
            self.classes.iter().map(|c| c.decl.direct_kind).collect();
        let mut enums: Vec<bool> = self.classes.iter().map(|c| c.decl.is_enum).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..self.classes.len() {
                if kinds[i].is_none() {
                    if let Some(kind) = self.bases[i].iter().find_map(|&b| kinds[b]) {
                        kinds[i] = Some(kind);
                        changed = true;
                    }
                }
                if !enums[i] && self.bases[i].iter().any(|&b| enums[b]) {
                    enums[i] = true;
                    changed = true;
                }
            }
        }
        (kinds, enums)
    }

    /// Effective field lists, bases first, via an iterative post-order walk.
    fn merge_fields(&self, kinds: &[Option<SchemaKind>]) -> Vec<Option<Vec<SchemaField>>> {
        let n = self.classes.len();
        let mut merged: Vec<Option<Vec<SchemaField>>> = vec![None; n];
        let mut state = vec![Visit::Fresh; n];

        for root in (0..n).filter(|&i| kinds[i].is_some()) {
            let mut stack = vec![(root, false)];
            while let Some((i, expanded)) = stack.pop() {
                if expanded {
                    merged[i] = Some(self.merge_one(i, kinds, &merged));
                    state[i] = Visit::Done;
                    continue;
                }
                if state[i] != Visit::Fresh {
                    continue;
                }
                state[i] = Visit::Open;
                stack.push((i, true));
                for &b in self.bases[i].iter().rev() {
                    if kinds[b].is_some() && state[b] == Visit::Fresh {
                        stack.push((b, false));
                    }
                }
            }
        }
        merged
    }

    fn merge_one(
        &self,
        i: usize,
        kinds: &[Option<SchemaKind>],
        merged: &[Option<Vec<SchemaField>>],
    ) -> Vec<SchemaField> {
        let mut fields: Vec<SchemaField> = Vec::new();
        for &b in &self.bases[i] {
            if kinds[b].is_none() {
                continue;
            }
            // Still open means a cycle; that base contributes nothing.
            let Some(inherited) = &merged[b] else {
                continue;
            };
            for field in inherited {
                if fields.iter().any(|f| f.name == field.name) {
                    continue;
                }
                let mut field = field.clone();
                if field.inherited_from.is_none() {
                    field.inherited_from = Some(self.classes[b].decl.name.clone());
                }
                fields.push(field);
            }
        }
        for own in &self.classes[i].decl.fields {
            match fields.iter_mut().find(|f| f.name == own.name) {
                Some(slot) => *slot = own.clone(),
                None => fields.push(own.clone()),
            }
        }
        fields
    }

    /// Enum class a field type refers to, looked up like a base.
    fn enum_values_for(&self, from: usize, name: &str, enums: &[bool]) -> Option<usize> {
        let base = BaseRef {
            written: name.to_string(),
            symbol: name.rsplit('.').next().unwrap_or(name).to_string(),
            module: None,
            qualified: None,
        };
        let here = self.classes[from].file;
        let target = self.find_base(from, &base).or_else(|| {
            self.by_name
                .get(base.symbol.as_str())?
                .iter()
                .copied()
                .find(|&i| self.classes[i].file == here)
        })?;
        enums[target].then_some(target)
    }

    fn resolve(&self) -> Vec<SchemaFact> {
        let (kinds, enums) = self.recognize();
        let merged = self.merge_fields(&kinds);

        let mut schemas = Vec::new();
        for (i, class) in self.classes.iter().enumerate() {
            let (Some(kind), Some(fields)) = (kinds[i], &merged[i]) else {
                continue;
            };
            let mut fields = fields.clone();
            let mut degradations = BTreeSet::new();
            for field in &mut fields {
                if field.ty.descriptor.is_unknown() {
                    degradations.insert(Degradation::UnknownType);
                }
                if !field.constraints.enum_values.is_empty() {
                    continue;
                }
                let target = field
                    .ty
                    .descriptor
                    .referenced_name()
                    .and_then(|name| self.enum_values_for(i, name, &enums));
                if let Some(target) = target {
                    field.constraints.enum_values = self.classes[target].decl.enum_values.clone();
                }
            }

            schemas.push(SchemaFact {
                file: class.file.to_string(),
                span: class.decl.span,
                name: class.decl.name.clone(),
                kind,
                bases: class.decl.bases.iter().map(|b| b.written.clone()).collect(),
                type_params: class.decl.type_params.clone(),
                fields,
                config: class.decl.config.clone(),
                validators: class.decl.validators.clone(),
                doc: class.decl.doc.clone(),
                degradations,
            });
        }
        schemas.sort_by(|a, b| (&a.file, a.span).cmp(&(&b.file, b.span)));
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::languages::PythonAnalyzer;
    use crate::analysis::types::{LiteralValue, TypeDescriptor};

    fn facts(path: &str, module: &str, source: &str) -> FileFacts {
        PythonAnalyzer::new()
            .analyze_source(path, Some(module), source)
            .unwrap()
    }

    #[test]
    fn test_inherited_fields_override_in_place() {
        let base = facts(
            "app/base.py",
            "app.base",
            "from datetime import datetime\nfrom pydantic import BaseModel\n\nclass Timestamped(BaseModel):\n    id: int\n    created_at: datetime\n",
        );
        let user = facts(
            "app/user.py",
            "app.user",
            "from typing import Optional\nfrom .base import Timestamped\n\nclass User(Timestamped):\n    name: str\n    created_at: Optional[str] = None\n",
        );

        let unit = resolve_unit(vec![user, base], false);
        let user = unit.schemas.iter().find(|s| s.name == "User").unwrap();
        assert_eq!(user.kind, SchemaKind::Pydantic);
        let names: Vec<&str> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "created_at", "name"]);
        assert_eq!(user.fields[0].inherited_from.as_deref(), Some("Timestamped"));
        assert_eq!(user.fields[1].inherited_from, None);
        assert!(!user.fields[1].required);
    }

    #[test]
    fn test_enum_values_filled_from_enum_class() {
        let source = r#"
from enum import Enum
from pydantic import BaseModel

class Status(str, Enum):
    ACTIVE = "active"
    DISABLED = "disabled"

class Account(BaseModel):
    status: Status
"#;
        let unit = resolve_unit(vec![facts("m.py", "m", source)], false);
        assert_eq!(unit.schemas.len(), 1);
        let status = &unit.schemas[0].fields[0];
        assert_eq!(
            status.ty.descriptor,
            TypeDescriptor::reference("Status")
        );
        assert_eq!(
            status.constraints.enum_values,
            vec![
                LiteralValue::Str("active".into()),
                LiteralValue::Str("disabled".into())
            ]
        );
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let source = "from pydantic import BaseModel\nclass A(B, BaseModel):\n    a: int\nclass B(A):\n    b: int\n";
        let unit = resolve_unit(vec![facts("c.py", "c", source)], false);
        assert_eq!(unit.schemas.len(), 2);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let source = "from fastapi import FastAPI\napp = FastAPI()\n@app.get('/a')\ndef a():\n    pass\n";
        let files = vec![facts("x.py", "x", source), facts("y.py", "y", source)];
        let one = resolve_unit(files.clone(), false);
        let two = resolve_unit(files, true);
        assert_eq!(
            serde_json::to_string(&one).unwrap(),
            serde_json::to_string(&two).unwrap()
        );
        assert_eq!(one.routes[0].effective_path.as_deref(), Some("/a"));
    }

    #[test]
    fn test_aliased_router_included_from_another_file() {
        let items = "from fastapi import APIRouter\nrouter = APIRouter(prefix='/items')\nr2 = router\n@router.get('/x')\ndef x():\n    pass\n";
        let main = "from fastapi import FastAPI\nfrom app.items import router\napp = FastAPI()\napp.include_router(router, prefix='/api')\n";

        let mut outputs = Vec::new();
        for _ in 0..16 {
            let files = vec![
                facts("app/items.py", "app.items", items),
                facts("app/main.py", "app.main", main),
            ];
            let unit = resolve_unit(files, true);
            assert!(unit.unresolved_includes.is_empty());
            assert_eq!(unit.routes[0].effective_path.as_deref(), Some("/api/items/x"));
            let group = unit.groups.iter().find(|g| g.key.file == "app/items.py").unwrap();
            assert_eq!(group.key.name, "router");
            assert_eq!(group.status, GroupStatus::Linked);
            outputs.push(serde_json::to_string(&unit).unwrap());
        }
        outputs.dedup();
        assert_eq!(outputs.len(), 1);
    }
}
