//! Route, route-group and include extraction for FastAPI and Flask.
//!
//! Groups are the bindings whose constructor has a route-group role. Routes
//! are decorators or registration calls on such a binding. Include calls
//! are recorded as edges for the unit pass, which composes prefixes once
//! every file has been seen.

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

use crate::analysis::facts::{
    Degradation, Framework, GroupInclude, GroupKey, GroupStatus, HttpMethod, IncludeTarget,
    ParameterSource, RegistrationStyle, ResponseInfo, RouteFact, RouteGroupFact, RouteMetadata,
    RouteParameter,
};
use crate::analysis::types::{TypeDescriptor, TypeInfo};
use crate::parser::{Node, NodeId};

use super::bindings::{parameter_parts, unwrap_type};
use super::catalog::{self, Role};
use super::docstring::docstring_of;
use super::values::{
    bool_value, constraints_from, default_summary, dict_entries, int_value, is_ellipsis,
    string_list, string_literal, unwrap_parens, CallArgs,
};
use super::FileContext;

lazy_static! {
    /// Flask `<conv:name>` / `<name>` and FastAPI `{name}` / `{name:path}`.
    static ref PATH_PARAM: Regex = Regex::new(
        r"<(?:([A-Za-z_][A-Za-z0-9_]*)(?:\([^>]*\))?:)?([A-Za-z_][A-Za-z0-9_]*)>|\{([A-Za-z_][A-Za-z0-9_]*)(?::[A-Za-z_]+)?\}"
    ).unwrap();

    /// `status.HTTP_201_CREATED`
    static ref STATUS_CONSTANT: Regex = Regex::new(r"HTTP_(\d{3})(?:_|$)").unwrap();
}

/// Handler parameters the framework injects rather than reads from the request.
static INJECTED_TYPES: phf::Set<&'static str> = phf_set! {
    "fastapi.Request",
    "fastapi.Response",
    "fastapi.WebSocket",
    "fastapi.BackgroundTasks",
    "fastapi.requests.Request",
    "fastapi.responses.Response",
    "starlette.requests.Request",
    "starlette.responses.Response",
    "starlette.websockets.WebSocket",
    "starlette.background.BackgroundTasks",
};

/// Route-level facts of one file.
#[derive(Debug, Default)]
pub struct RouteExtraction {
    pub routes: Vec<RouteFact>,
    pub groups: Vec<RouteGroupFact>,
    pub includes: Vec<GroupInclude>,
}

pub fn extract(cx: &FileContext<'_>) -> RouteExtraction {
    let mut groups = collect_groups(cx);
    let keys: HashMap<NodeId, GroupKey> = groups
        .iter()
        .map(|(origin, group)| (*origin, group.key.clone()))
        .collect();

    let mut routes = Vec::new();
    let mut includes = Vec::new();
    for node in cx.tree.root().descendants() {
        match node.kind() {
            "decorated_definition" => routes.extend(decorator_routes(cx, node, &keys)),
            "call" => {
                if let Some(route) = registration_route(cx, node, &keys) {
                    routes.push(route);
                } else if let Some(include) = include_edge(cx, node, &keys) {
                    includes.push(include);
                }
            }
            _ => {}
        }
    }

    let mut by_key: HashMap<GroupKey, usize> = HashMap::new();
    for (i, (_, group)) in groups.iter().enumerate() {
        by_key.insert(group.key.clone(), i);
    }
    for route in &routes {
        if let Some(i) = route.group.as_ref().and_then(|k| by_key.get(k)) {
            groups[*i].1.members.push(route.span);
        }
    }

    RouteExtraction {
        routes,
        groups: groups.into_iter().map(|(_, g)| g).collect(),
        includes,
    }
}

// =============================================================================
// Groups
// =============================================================================

/// One group per constructing call, keyed by its first binding.
fn collect_groups(cx: &FileContext<'_>) -> Vec<(NodeId, RouteGroupFact)> {
    let mut bindings: Vec<_> = cx
        .table
        .role_bindings()
        .filter(|b| b.role.as_ref().map(Role::is_route_group).unwrap_or(false))
        .collect();
    // The constructing assignment names the group; aliases come later.
    bindings.sort_by_key(|b| {
        (
            cx.tree.node(b.origin).start_byte(),
            !assigns_directly(cx, b.origin, &b.variable),
            cx.tree.node(b.declared_at).start_byte(),
            b.variable.clone(),
        )
    });
    bindings.dedup_by_key(|b| b.origin);

    bindings
        .into_iter()
        .filter_map(|binding| {
            let Some(Role::RouteGroup { framework, kind }) = binding.role.clone() else {
                return None;
            };
            let origin = cx.tree.node(binding.origin);
            let args = CallArgs::of(origin);
            let declared_prefix = args
                .keyword("prefix")
                .or_else(|| args.keyword("url_prefix"))
                .and_then(string_literal);
            let group = RouteGroupFact {
                key: GroupKey {
                    file: cx.file.to_string(),
                    name: binding.variable.clone(),
                    offset: origin.start_byte(),
                },
                span: cx.tree.node(binding.declared_at).span(),
                framework,
                kind,
                declared_prefix,
                parent: None,
                mount_prefix: None,
                effective_prefix: None,
                status: GroupStatus::Root,
                members: Vec::new(),
            };
            Some((binding.origin, group))
        })
        .collect()
}

/// Whether `variable` is the assignment target of the call at `origin`.
fn assigns_directly(cx: &FileContext<'_>, origin: NodeId, variable: &str) -> bool {
    let mut node = cx.tree.node(origin);
    while let Some(parent) = node.parent() {
        match parent.kind() {
            "await" | "parenthesized_expression" => node = parent,
            "assignment" => {
                return parent
                    .child_by_field("left")
                    .map(|left| left.text() == variable)
                    .unwrap_or(false)
            }
            _ => return false,
        }
    }
    false
}

/// Route-group instance an expression refers to, with the key of its group.
fn group_of(
    cx: &FileContext<'_>,
    object: Node<'_>,
    keys: &HashMap<NodeId, GroupKey>,
) -> Option<(Framework, Option<GroupKey>)> {
    let instance = cx.table.resolve_instance(object, cx.catalog)?;
    let Role::RouteGroup { framework, .. } = instance.role else {
        return None;
    };
    let key = instance.origin.and_then(|o| keys.get(&o)).cloned();
    Some((framework, key))
}

/// `router.include_router(child, prefix=...)` and friends.
fn include_edge(
    cx: &FileContext<'_>,
    call: Node<'_>,
    keys: &HashMap<NodeId, GroupKey>,
) -> Option<GroupInclude> {
    let function = unwrap_parens(call.child_by_field("function")?);
    if function.kind() != "attribute" {
        return None;
    }
    let method = function.child_by_field("attribute")?.text();
    let layout = catalog::include_call(method)?;
    let (_, parent) = group_of(cx, function.child_by_field("object")?, keys)?;
    let parent = parent?;

    let args = CallArgs::of(call);
    let target = match args.arg(layout.target_index, layout.target_keyword) {
        Some(node) => include_target(cx, node, keys),
        None => IncludeTarget::Unknown {
            expr: String::new(),
        },
    };
    let prefix = match layout.prefix_index {
        Some(index) => args.arg(index, layout.prefix_keyword),
        None => args.keyword(layout.prefix_keyword),
    }
    .and_then(string_literal);

    Some(GroupInclude {
        file: cx.file.to_string(),
        span: call.span(),
        method: method.to_string(),
        parent,
        target,
        prefix,
        replaces_prefix: layout.replaces_prefix,
    })
}

fn include_target(
    cx: &FileContext<'_>,
    node: Node<'_>,
    keys: &HashMap<NodeId, GroupKey>,
) -> IncludeTarget {
    if let Some((_, Some(key))) = group_of(cx, node, keys) {
        return IncludeTarget::Local { key };
    }
    let node = unwrap_parens(node);
    if matches!(node.kind(), "identifier" | "attribute") {
        if let Some(path) = cx.table.qualify(node) {
            return match path.rsplit_once('.') {
                Some((module, name)) => IncludeTarget::Imported {
                    module: module.to_string(),
                    name: name.to_string(),
                },
                None => IncludeTarget::Imported {
                    module: String::new(),
                    name: path,
                },
            };
        }
    }
    IncludeTarget::Unknown {
        expr: node.text().to_string(),
    }
}

// =============================================================================
// Routes
// =============================================================================

struct RouteSite<'t> {
    span_node: Node<'t>,
    call: Node<'t>,
    framework: Framework,
    group: Option<GroupKey>,
    fixed_method: Option<HttpMethod>,
    path_keyword: &'static str,
    handler: Option<Node<'t>>,
    handler_name: String,
    style: RegistrationStyle,
}

fn decorator_routes(
    cx: &FileContext<'_>,
    decorated: Node<'_>,
    keys: &HashMap<NodeId, GroupKey>,
) -> Vec<RouteFact> {
    let Some(definition) = decorated.child_by_field("definition") else {
        return Vec::new();
    };
    if definition.kind() != "function_definition" {
        return Vec::new();
    }
    let handler_name = definition
        .child_by_field("name")
        .map(|n| n.text().to_string())
        .unwrap_or_default();

    let registrations = cx
        .table
        .definition_of(definition)
        .map(|d| d.registrations.clone())
        .unwrap_or_default();

    let mut routes = Vec::new();
    for decorator in registrations.into_iter().map(|id| cx.tree.node(id)) {
        let Some(call) = decorator.named_children().next().map(unwrap_parens) else {
            continue;
        };
        if call.kind() != "call" {
            continue;
        }
        let Some(function) = call.child_by_field("function").map(unwrap_parens) else {
            continue;
        };
        if function.kind() != "attribute" {
            continue;
        }
        let (Some(object), Some(name)) = (
            function.child_by_field("object"),
            function.child_by_field("attribute"),
        ) else {
            continue;
        };
        let Some((framework, group)) = group_of(cx, object, keys) else {
            continue;
        };
        let Some(fixed_method) = catalog::route_decorator(framework, name.text()) else {
            continue;
        };
        let path_keyword = match framework {
            Framework::FastApi => "path",
            Framework::Flask => "rule",
        };
        routes.push(build_route(
            cx,
            RouteSite {
                span_node: decorated,
                call,
                framework,
                group,
                fixed_method,
                path_keyword,
                handler: Some(definition),
                handler_name: handler_name.clone(),
                style: RegistrationStyle::Decorator,
            },
        ));
    }
    routes
}

/// `app.add_url_rule("/x", view_func=handler)` / `app.add_api_route("/x", handler)`.
fn registration_route(
    cx: &FileContext<'_>,
    call: Node<'_>,
    keys: &HashMap<NodeId, GroupKey>,
) -> Option<RouteFact> {
    let function = unwrap_parens(call.child_by_field("function")?);
    if function.kind() != "attribute" {
        return None;
    }
    let layout = catalog::registration_call(function.child_by_field("attribute")?.text())?;
    let (framework, group) = group_of(cx, function.child_by_field("object")?, keys)?;

    let args = CallArgs::of(call);
    let handler_expr = args.arg(layout.handler_index, layout.handler_keyword);
    let handler = handler_expr
        .map(unwrap_parens)
        .filter(|h| h.kind() == "identifier")
        .and_then(|h| cx.table.definition(h.text(), h))
        .map(|def| cx.tree.node(def.node))
        .filter(|def| def.kind() == "function_definition");
    let handler_name = match (handler, handler_expr) {
        (Some(def), _) => def
            .child_by_field("name")
            .map(|n| n.text().to_string())
            .unwrap_or_default(),
        (None, Some(expr)) => expr.text().to_string(),
        (None, None) => String::new(),
    };

    Some(build_route(
        cx,
        RouteSite {
            span_node: call,
            call,
            framework,
            group,
            fixed_method: None,
            path_keyword: layout.path_keyword,
            handler,
            handler_name,
            style: RegistrationStyle::Call,
        },
    ))
}

fn build_route(cx: &FileContext<'_>, site: RouteSite<'_>) -> RouteFact {
    let args = CallArgs::of(site.call);
    let mut degradations = BTreeSet::new();

    let methods = match site.fixed_method {
        Some(method) => vec![method],
        None => match args.keyword("methods") {
            Some(node) => match string_list(node) {
                Some(names) => {
                    let mut methods: Vec<HttpMethod> = Vec::new();
                    for method in names.iter().filter_map(|n| HttpMethod::from_name(n)) {
                        if !methods.contains(&method) {
                            methods.push(method);
                        }
                    }
                    methods
                }
                None => {
                    degradations.insert(Degradation::UnknownMethod);
                    Vec::new()
                }
            },
            None => vec![HttpMethod::Get],
        },
    };

    let raw_path = args.arg(0, site.path_keyword).and_then(string_literal);
    if raw_path.is_none() {
        degradations.insert(Degradation::UnknownPath);
    }
    if site.handler.is_none() {
        degradations.insert(Degradation::UnknownHandler);
    }

    let path_params = raw_path.as_deref().map(path_parameters).unwrap_or_default();
    let parameters = match site.handler {
        Some(handler) => handler_parameters(cx, handler, site.framework, &path_params, &mut degradations),
        None => Vec::new(),
    };
    let parameters = with_missing_path_params(parameters, &path_params);

    let normalizer = cx.normalizer();
    let response_type = args
        .keyword("response_model")
        .map(|node| normalizer.normalize(node))
        .or_else(|| {
            site.handler
                .and_then(|h| h.child_by_field("return_type"))
                .map(|node| normalizer.normalize(node))
        });

    let mut metadata = route_metadata(cx, &args);
    if metadata.description.is_none() {
        metadata.description = site
            .handler
            .and_then(|h| h.child_by_field("body"))
            .and_then(docstring_of);
    }

    RouteFact {
        file: cx.file.to_string(),
        span: site.span_node.span(),
        framework: site.framework,
        handler: site.handler_name,
        is_async: site.handler.map(|h| h.has_token("async")).unwrap_or(false),
        methods,
        raw_path,
        effective_path: None,
        parameters,
        response_type,
        metadata,
        group: site.group,
        style: site.style,
        degradations,
    }
}

/// Placeholders in a route path with their Flask converter, if any.
pub fn path_parameters(path: &str) -> Vec<(String, Option<String>)> {
    PATH_PARAM
        .captures_iter(path)
        .filter_map(|caps| {
            if let Some(name) = caps.get(2) {
                let converter = caps
                    .get(1)
                    .map(|c| c.as_str().to_string())
                    .or_else(|| Some("string".to_string()));
                Some((name.as_str().to_string(), converter))
            } else {
                caps.get(3).map(|name| (name.as_str().to_string(), None))
            }
        })
        .collect()
}

fn converter_type(converter: &str) -> TypeInfo {
    match converter {
        "int" => TypeDescriptor::primitive("int").into(),
        "float" => TypeDescriptor::primitive("float").into(),
        "uuid" => TypeDescriptor::primitive("uuid").into(),
        "path" => TypeInfo::new(TypeDescriptor::primitive("string")).with_alias("path"),
        _ => TypeDescriptor::primitive("string").into(),
    }
}

/// Marker call (`Query(...)`, `Depends(...)`) in a parameter's default or
/// `Annotated` metadata.
fn marker_call<'t>(
    cx: &FileContext<'_>,
    default: Option<Node<'t>>,
    annotation: Option<Node<'t>>,
) -> Option<(Node<'t>, ParameterSource, bool)> {
    let is_marker = |node: Node<'t>| -> Option<ParameterSource> {
        if node.kind() != "call" {
            return None;
        }
        let path = cx.table.qualify(node.child_by_field("function")?)?;
        catalog::parameter_marker(&path)
    };
    if let Some(default) = default.map(unwrap_parens) {
        if let Some(source) = is_marker(default) {
            return Some((default, source, true));
        }
    }
    annotation?
        .descendants()
        .take(256)
        .find_map(|n| is_marker(n).map(|source| (n, source, false)))
}

fn handler_parameters(
    cx: &FileContext<'_>,
    handler: Node<'_>,
    framework: Framework,
    path_params: &[(String, Option<String>)],
    degradations: &mut BTreeSet<Degradation>,
) -> Vec<RouteParameter> {
    let Some(list) = handler.child_by_field("parameters") else {
        return Vec::new();
    };
    let normalizer = cx.normalizer();
    let mut parameters = Vec::new();

    for param in list.named_children() {
        let Some((name_node, annotation)) = parameter_parts(param) else {
            continue;
        };
        let name = name_node.text();
        if name == "self" || name == "cls" {
            continue;
        }
        if let Some(annotation) = annotation {
            let injected = cx
                .table
                .qualify(unwrap_type(annotation))
                .map(|p| INJECTED_TYPES.contains(p.as_str()))
                .unwrap_or(false);
            if injected {
                continue;
            }
        }
        let default = param.child_by_field("value");
        let path_param = path_params.iter().find(|(n, _)| n == name);
        let marker = marker_call(cx, default, annotation);

        let annotation_info = annotation.map(|a| normalizer.normalize(a));
        let mut constraints = annotation
            .map(|a| normalizer.constraints(a))
            .unwrap_or_default();

        let mut alias = None;
        let mut description = None;
        let mut explicit_type = None;
        let (required, default_text) = match marker {
            Some((call, source, in_default)) => {
                let args = CallArgs::of(call);
                let mut from_marker = constraints_from(&args);
                from_marker.merge_missing(&constraints);
                constraints = from_marker;
                alias = args.keyword("alias").and_then(string_literal);
                description = args
                    .keyword("description")
                    .or_else(|| args.keyword("title"))
                    .and_then(string_literal);
                explicit_type = args
                    .keyword("annotation")
                    .or_else(|| args.keyword("type"))
                    .map(|t| normalizer.normalize(t));
                if source == ParameterSource::Dependency {
                    let dependency = args.arg(0, "dependency").map(|d| d.text().to_string());
                    (true, dependency)
                } else if in_default {
                    match args.arg(0, "default") {
                        Some(value) if is_ellipsis(value) => (true, None),
                        Some(value) => (false, Some(default_summary(value))),
                        None if args.keyword("default_factory").is_some() => (false, None),
                        None => (true, None),
                    }
                } else {
                    match default {
                        Some(value) => (false, Some(default_summary(value))),
                        None => (true, None),
                    }
                }
            }
            None => match default {
                Some(value) => (false, Some(default_summary(value))),
                None => (true, None),
            },
        };

        let mut type_conflict = None;
        let ty = match (explicit_type, annotation_info) {
            (Some(explicit), Some(annotated)) => {
                if explicit.descriptor != annotated.descriptor {
                    type_conflict = Some(annotated);
                    degradations.insert(Degradation::TypeConflict);
                }
                explicit
            }
            (Some(explicit), None) => explicit,
            (None, Some(annotated)) => annotated,
            (None, None) => match path_param {
                Some((_, Some(converter))) => converter_type(converter),
                _ if framework == Framework::Flask && path_param.is_some() => {
                    TypeDescriptor::primitive("string").into()
                }
                _ => TypeInfo::unknown(),
            },
        };
        if ty.descriptor.is_unknown() {
            degradations.insert(Degradation::UnknownType);
        }

        let source = match marker {
            Some((_, source, _)) => source,
            None if path_param.is_some() => ParameterSource::Path,
            None if framework == Framework::FastApi && ty.descriptor.mentions_reference() => {
                ParameterSource::Body
            }
            None => ParameterSource::Query,
        };

        parameters.push(RouteParameter {
            name: name.to_string(),
            source,
            ty,
            required,
            default: default_text,
            alias,
            description,
            constraints,
            type_conflict,
        });
    }
    parameters
}

/// Path placeholders the handler signature does not mention.
fn with_missing_path_params(
    mut parameters: Vec<RouteParameter>,
    path_params: &[(String, Option<String>)],
) -> Vec<RouteParameter> {
    for (name, converter) in path_params {
        if parameters.iter().any(|p| &p.name == name) {
            continue;
        }
        parameters.push(RouteParameter {
            name: name.clone(),
            source: ParameterSource::Path,
            ty: converter
                .as_deref()
                .map(converter_type)
                .unwrap_or_else(TypeInfo::unknown),
            required: true,
            default: None,
            alias: None,
            description: None,
            constraints: Default::default(),
            type_conflict: None,
        });
    }
    parameters
}

fn status_code(node: Node<'_>) -> Option<u16> {
    if let Some(code) = int_value(node) {
        return u16::try_from(code).ok();
    }
    let text = unwrap_parens(node).text();
    STATUS_CONSTANT
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

fn route_metadata(cx: &FileContext<'_>, args: &CallArgs<'_>) -> RouteMetadata {
    let normalizer = cx.normalizer();
    let mut metadata = RouteMetadata {
        tags: args.keyword("tags").and_then(string_list).unwrap_or_default(),
        deprecated: args.keyword("deprecated").and_then(bool_value).unwrap_or(false),
        status_code: args.keyword("status_code").and_then(status_code),
        summary: args.keyword("summary").and_then(string_literal),
        description: args.keyword("description").and_then(string_literal),
        operation_id: args.keyword("operation_id").and_then(string_literal),
        ..RouteMetadata::default()
    };
    if let Some(responses) = args.keyword("responses") {
        for (code, value) in dict_entries(responses) {
            let mut info = ResponseInfo::default();
            for (key, field) in dict_entries(value) {
                match key.as_str() {
                    "model" => info.model = Some(normalizer.normalize(field)),
                    "description" => info.description = string_literal(field),
                    _ => {}
                }
            }
            metadata.responses.insert(code, info);
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::languages::python::test_support::with_context;

    fn routes(source: &str) -> RouteExtraction {
        with_context(source, extract)
    }

    const ROUTER: &str = r#"
from fastapi import APIRouter, Path, Query, Depends
from pydantic import BaseModel

router = APIRouter(prefix="/api/v1", tags=["items"])

class Item(BaseModel):
    name: str

@router.get("/items/{item_id}/variants/{variant_id}")
async def get_item_variant(
    item_id: int = Path(..., gt=0),
    variant_id: str = Path(...),
) -> dict:
    """Fetch one variant."""
    pass

@router.post("/items", response_model=Item, status_code=201)
async def create_item(item: Item, db = Depends(get_db), q: str | None = Query(None, max_length=50)):
    pass
"#;

    #[test]
    fn test_fastapi_decorators() {
        let out = routes(ROUTER);
        assert_eq!(out.routes.len(), 2);
        assert_eq!(out.groups.len(), 1);
        assert_eq!(out.groups[0].declared_prefix.as_deref(), Some("/api/v1"));
        assert_eq!(out.groups[0].members.len(), 2);

        let variant = &out.routes[0];
        assert_eq!(variant.methods, vec![HttpMethod::Get]);
        assert_eq!(variant.handler, "get_item_variant");
        assert!(variant.is_async);
        assert_eq!(
            variant.raw_path.as_deref(),
            Some("/items/{item_id}/variants/{variant_id}")
        );
        assert_eq!(variant.metadata.description.as_deref(), Some("Fetch one variant."));
        let params = &variant.parameters;
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "item_id");
        assert_eq!(params[0].source, ParameterSource::Path);
        assert_eq!(params[0].ty.descriptor, TypeDescriptor::primitive("int"));
        assert!(params[0].required);
        assert!(params[0].constraints.gt.is_some());
        assert_eq!(params[1].ty.descriptor, TypeDescriptor::primitive("string"));

        let create = &out.routes[1];
        assert_eq!(create.methods, vec![HttpMethod::Post]);
        assert_eq!(create.metadata.status_code, Some(201));
        assert_eq!(
            create.response_type.as_ref().map(|t| &t.descriptor),
            Some(&TypeDescriptor::reference("Item"))
        );
        let params = &create.parameters;
        assert_eq!(params[0].source, ParameterSource::Body);
        assert_eq!(params[1].source, ParameterSource::Dependency);
        assert_eq!(params[2].source, ParameterSource::Query);
        assert!(!params[2].required);
        assert_eq!(params[2].default.as_deref(), Some("None"));
        assert_eq!(params[2].constraints.max_length, Some(50));
    }

    #[test]
    fn test_flask_routes_and_registration() {
        let out = routes(
            r#"
from flask import Blueprint

bp = Blueprint("files", __name__, url_prefix="/files")

@bp.route("/<int:file_id>/<name>", methods=["GET", "PUT"])
def file_detail(file_id, name):
    pass

@bp.route("/<path:filepath>")
def raw(filepath):
    pass

def legacy():
    pass

bp.add_url_rule("/legacy", "legacy", legacy, methods=["POST"])
"#,
        );
        assert_eq!(out.groups[0].declared_prefix.as_deref(), Some("/files"));
        assert_eq!(out.routes.len(), 3);

        let detail = &out.routes[0];
        assert_eq!(detail.methods, vec![HttpMethod::Get, HttpMethod::Put]);
        assert_eq!(detail.parameters[0].ty.descriptor, TypeDescriptor::primitive("int"));
        assert_eq!(detail.parameters[1].ty.descriptor, TypeDescriptor::primitive("string"));
        assert!(detail.parameters.iter().all(|p| p.source == ParameterSource::Path));

        let raw = &out.routes[1];
        assert_eq!(raw.methods, vec![HttpMethod::Get]);
        assert_eq!(raw.parameters[0].ty.alias.as_deref(), Some("path"));

        let legacy = &out.routes[2];
        assert_eq!(legacy.style, RegistrationStyle::Call);
        assert_eq!(legacy.handler, "legacy");
        assert_eq!(legacy.methods, vec![HttpMethod::Post]);
        assert!(legacy.degradations.is_empty());
    }

    #[test]
    fn test_includes_are_recorded() {
        let out = routes(
            r#"
from fastapi import FastAPI, APIRouter
from .routers import items
from .admin import router as admin_router

app = FastAPI()
local = APIRouter(prefix="/local")
app.include_router(local, prefix="/v1")
app.include_router(items.router)
app.include_router(admin_router, prefix="/admin")
"#,
        );
        assert_eq!(out.includes.len(), 3);
        assert!(matches!(out.includes[0].target, IncludeTarget::Local { .. }));
        assert_eq!(out.includes[0].prefix.as_deref(), Some("/v1"));
        assert_eq!(
            out.includes[1].target,
            IncludeTarget::Imported {
                module: ".routers.items".into(),
                name: "router".into()
            }
        );
        assert_eq!(
            out.includes[2].target,
            IncludeTarget::Imported {
                module: ".admin".into(),
                name: "router".into()
            }
        );
        assert_eq!(out.includes[0].parent.name, "app");
    }

    #[test]
    fn test_explicit_marker_type_wins() {
        let out = routes(
            r#"
from fastapi import FastAPI, Query
app = FastAPI()

@app.get("/search")
def search(limit: str = Query(10, annotation=int)):
    pass
"#,
        );
        let param = &out.routes[0].parameters[0];
        assert_eq!(param.ty.descriptor, TypeDescriptor::primitive("int"));
        assert_eq!(
            param.type_conflict.as_ref().map(|t| &t.descriptor),
            Some(&TypeDescriptor::primitive("string"))
        );
        assert!(out.routes[0].degradations.contains(&Degradation::TypeConflict));
        assert!(!param.required);
    }

    #[test]
    fn test_non_literal_path_degrades() {
        let out = routes("from flask import Flask\napp = Flask(__name__)\n@app.route(PREFIX + '/x')\ndef x():\n    pass\n");
        assert_eq!(out.routes.len(), 1);
        assert_eq!(out.routes[0].raw_path, None);
        assert!(out.routes[0].degradations.contains(&Degradation::UnknownPath));
    }

    #[test]
    fn test_decorators_on_other_objects_are_ignored() {
        let out = routes("import functools\n@functools.lru_cache()\ndef f():\n    pass\n@cache.get('/x')\ndef g():\n    pass\n");
        assert!(out.routes.is_empty());
    }

    #[test]
    fn test_path_parameter_parsing() {
        assert_eq!(
            path_parameters("/a/<int:id>/<slug>/{rest:path}"),
            vec![
                ("id".to_string(), Some("int".to_string())),
                ("slug".to_string(), Some("string".to_string())),
                ("rest".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_aliased_group_keeps_its_declared_name() {
        let source = "from fastapi import APIRouter\nrouter = APIRouter(prefix='/a')\nalias = router\n@alias.get('/x')\ndef x():\n    pass\n@router.get('/y')\ndef y():\n    pass\n";
        for _ in 0..32 {
            let out = routes(source);
            assert_eq!(out.groups.len(), 1);
            assert_eq!(out.groups[0].key.name, "router");
            assert_eq!(out.groups[0].members.len(), 2);
            assert!(out
                .routes
                .iter()
                .all(|r| r.group.as_ref() == Some(&out.groups[0].key)));
        }
    }
}
