//! Integration tests for the full extraction pipeline.
//!
//! These tests run both passes over the testdata fixtures and check the
//! unit-level facts: effective route paths across files, inherited schema
//! fields, HTTP call shapes and tool signatures.

use std::path::PathBuf;

use apiscan::analysis::facts::{
    CallConvention, GroupStatus, ParameterSource, SchemaKind, ToolKind, UrlSegment,
};
use apiscan::analysis::{Degradation, HttpMethod, RouteFact, TypeDescriptor, UrlExpression};
use apiscan::cli::collect_files;
use apiscan::{AnalysisContext, Config, PythonAnalyzer, UnitFacts};
use globset::GlobSet;

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

/// Collect and analyze every Python file under a fixture directory.
fn scan(dir: &str, parallel: bool) -> UnitFacts {
    apiscan::init();

    let root = testdata_path().join(dir);
    let files = collect_files(&root, false, &GlobSet::empty()).expect("should collect files");
    AnalysisContext::new(&root).analyze_unit(&files, parallel)
}

fn route<'a>(unit: &'a UnitFacts, handler: &str) -> &'a RouteFact {
    unit.routes
        .iter()
        .find(|r| r.handler == handler)
        .unwrap_or_else(|| panic!("no route for {}", handler))
}

// =============================================================================
// Routes
// =============================================================================

#[test]
fn test_router_prefix_and_path_parameters() {
    let unit = scan("service", true);

    let variant = route(&unit, "get_item_variant");
    assert_eq!(variant.file, "app/routers/items.py");
    assert_eq!(variant.methods, vec![HttpMethod::Get]);
    assert_eq!(
        variant.effective_path.as_deref(),
        Some("/api/v1/items/{item_id}/variants/{variant_id}")
    );

    let params = &variant.parameters;
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].name, "item_id");
    assert_eq!(params[0].source, ParameterSource::Path);
    assert_eq!(params[0].ty.descriptor, TypeDescriptor::primitive("int"));
    assert_eq!(params[1].name, "variant_id");
    assert_eq!(params[1].source, ParameterSource::Path);
    assert_eq!(params[1].ty.descriptor, TypeDescriptor::primitive("string"));
    assert!(variant.degradations.is_empty());
}

#[test]
fn test_prefix_composition_across_files() {
    let unit = scan("service", true);

    // Included with a mount prefix from another file.
    assert_eq!(
        route(&unit, "read_user").effective_path.as_deref(),
        Some("/internal/users/{user_id}")
    );
    // Included before the route is declared.
    assert_eq!(
        route(&unit, "health").effective_path.as_deref(),
        Some("/ops/admin/health")
    );
}

#[test]
fn test_flask_registration_prefix_replaces_declared() {
    let unit = scan("service", true);

    let detail = route(&unit, "file_detail");
    assert_eq!(detail.methods, vec![HttpMethod::Get, HttpMethod::Delete]);
    assert_eq!(detail.effective_path.as_deref(), Some("/storage/<int:file_id>"));
    assert_eq!(detail.parameters[0].ty.descriptor, TypeDescriptor::primitive("int"));
}

#[test]
fn test_group_statuses() {
    let unit = scan("service", true);

    assert!(unit.unresolved_includes.is_empty());
    let roots = unit
        .groups
        .iter()
        .filter(|g| g.status == GroupStatus::Root)
        .count();
    assert_eq!(roots, 2, "FastAPI and Flask applications are the only roots");
    assert!(unit.groups.iter().all(|g| g.status != GroupStatus::Cyclic));
}

#[test]
fn test_include_cycle_terminates_and_is_flagged() {
    let unit = scan("cycle", true);

    assert!(unit
        .groups
        .iter()
        .all(|g| g.status == GroupStatus::Cyclic));
    assert_eq!(unit.unresolved_includes.len(), 1);

    let x = route(&unit, "x");
    assert_eq!(x.effective_path.as_deref(), Some("/a/x"));
    assert!(x.degradations.contains(&Degradation::UnresolvedGroup));
}

// =============================================================================
// HTTP calls
// =============================================================================

#[test]
fn test_bound_client_call() {
    let unit = scan("service", true);

    let call = unit
        .http_calls
        .iter()
        .find(|c| c.client.as_ref().and_then(|b| b.variable.as_deref()) == Some("client"))
        .expect("should find client.get");
    assert_eq!(call.method, Some(HttpMethod::Get));
    assert_eq!(
        call.url,
        UrlExpression::Templated {
            segments: vec![
                UrlSegment::Literal {
                    text: "/users/".into()
                },
                UrlSegment::Slot {
                    expr: "user_id".into()
                },
            ]
        }
    );
    assert_eq!(call.convention, CallConvention::BoundClient);
    assert_eq!(
        call.base_url,
        Some(UrlExpression::Literal {
            value: "https://api.example.com".into()
        })
    );
}

#[test]
fn test_alias_transparency() {
    let unit = scan("service", true);

    let by_variable = |name: &str| {
        unit.http_calls
            .iter()
            .find(|c| c.client.as_ref().and_then(|b| b.variable.as_deref()) == Some(name))
            .unwrap_or_else(|| panic!("no call through {}", name))
    };
    let direct = by_variable("client");
    let aliased = by_variable("aliased");

    assert_eq!(direct.library, aliased.library);
    assert_eq!(direct.method, aliased.method);
    assert_eq!(direct.url, aliased.url);
    assert_eq!(direct.base_url, aliased.base_url);
    assert_eq!(direct.convention, aliased.convention);
    assert_eq!(
        direct.client.as_ref().map(|b| &b.constructor),
        aliased.client.as_ref().map(|b| &b.constructor)
    );
}

#[test]
fn test_module_function_call_with_response_usage() {
    let unit = scan("service", true);

    let ping = unit
        .http_calls
        .iter()
        .find(|c| c.library == "requests")
        .expect("should find requests.get");
    assert_eq!(ping.convention, CallConvention::ModuleFunction);
    assert_eq!(ping.url.as_literal(), Some("https://status.example.com/ping"));
    assert_eq!(ping.response_variable.as_deref(), Some("r"));
    assert_eq!(
        ping.response_usage,
        vec!["raise_for_status".to_string(), "json".to_string()]
    );
}

// =============================================================================
// Schemas
// =============================================================================

#[test]
fn test_inherited_fields_and_defaults() {
    let unit = scan("service", true);

    let user = unit
        .schemas
        .iter()
        .find(|s| s.name == "User")
        .expect("should find User");
    assert_eq!(user.kind, SchemaKind::Pydantic);
    let names: Vec<&str> = user.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["id", "created_at", "name", "tags", "nickname", "display", "handle"]
    );
    assert_eq!(user.fields[0].inherited_from.as_deref(), Some("Timestamped"));
    assert_eq!(user.fields[1].inherited_from, None);
    assert!(!user.fields[1].required);

    let tags = &user.fields[3];
    assert!(!tags.required);
    assert_eq!(
        tags.ty.descriptor,
        TypeDescriptor::list(TypeDescriptor::primitive("string"))
    );
    assert_eq!(tags.default.as_deref(), Some("empty"));
}

#[test]
fn test_optional_spellings_are_equivalent() {
    let unit = scan("service", true);

    let user = unit.schemas.iter().find(|s| s.name == "User").unwrap();
    let expected = TypeDescriptor::optional(TypeDescriptor::primitive("string"));
    for name in ["nickname", "display", "handle"] {
        let field = user.fields.iter().find(|f| f.name == name).unwrap();
        assert_eq!(field.ty.descriptor, expected, "field {}", name);
    }
}

// =============================================================================
// Tools
// =============================================================================

#[test]
fn test_tool_signature() {
    let unit = scan("service", true);

    assert_eq!(unit.tools.len(), 1);
    let tool = &unit.tools[0];
    assert_eq!(tool.kind, ToolKind::Tool);
    assert_eq!(tool.name, "find_item");
    assert!(tool.is_async);
    assert_eq!(tool.server.name.as_deref(), Some("inventory"));
    assert_eq!(tool.summary.as_deref(), Some("Find items by name."));

    let names: Vec<&str> = tool.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["query", "limit"]);
    assert_eq!(tool.parameters[0].description.as_deref(), Some("Text to match."));
    assert!(!tool.parameters[1].required);
    assert_eq!(tool.parameters[1].default.as_deref(), Some("10"));
}

// =============================================================================
// Unit properties
// =============================================================================

#[test]
fn test_determinism_and_parallel_equivalence() {
    let first = serde_json::to_string(&scan("service", true)).unwrap();
    let second = serde_json::to_string(&scan("service", true)).unwrap();
    let sequential = serde_json::to_string(&scan("service", false)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, sequential);
}

#[test]
fn test_facts_are_ordered_by_file_and_span() {
    let unit = scan("service", true);

    let positions: Vec<(&str, usize)> = unit
        .routes
        .iter()
        .map(|r| (r.file.as_str(), r.span.start_byte))
        .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
    assert_eq!(unit.parse_error_count(), 0);
}

#[test]
fn test_config_extends_catalog() {
    apiscan::init();

    let root = testdata_path().join("custom");
    let config_path = Config::discover(&root).expect("should find apiscan.yaml");
    let config = Config::parse_file(&config_path).expect("should parse config");
    let files = collect_files(&root, false, &config.exclusions().unwrap()).unwrap();

    let plain = AnalysisContext::new(&root).analyze_unit(&files, false);
    assert!(plain.http_calls.is_empty());

    let analyzer = PythonAnalyzer::with_catalog(config.catalog().unwrap());
    let unit = AnalysisContext::new(&root)
        .with_analyzer(analyzer)
        .analyze_unit(&files, false);
    assert_eq!(unit.http_calls.len(), 1);
    assert_eq!(unit.http_calls[0].library, "internal");
    assert_eq!(unit.http_calls[0].method, Some(HttpMethod::Post));
}
