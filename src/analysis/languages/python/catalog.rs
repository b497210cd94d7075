//! Recognition catalog: which qualified names mean what.
//!
//! The static tables cover the libraries and frameworks apiscan knows out of
//! the box. [`Catalog`] layers project-specific additions from the config
//! file on top of them.

use std::borrow::Cow;
use std::collections::HashMap;

use phf::{phf_map, phf_set};

use crate::analysis::facts::{
    Framework, GroupKind, HttpMethod, OptionKind, ParameterSource, SchemaKind, ToolKind,
};

pub type Name = Cow<'static, str>;

/// What a constructor call produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// An HTTP client or session object.
    HttpClient { library: Name, is_async: bool },
    /// A web application, router or blueprint.
    RouteGroup { framework: Framework, kind: GroupKind },
    /// A tool server (MCP).
    ToolServer { framework: Name },
}

impl Role {
    pub fn is_route_group(&self) -> bool {
        matches!(self, Role::RouteGroup { .. })
    }
}

static CONSTRUCTORS: phf::Map<&'static str, Role> = phf_map! {
    "httpx.Client" => Role::HttpClient { library: Cow::Borrowed("httpx"), is_async: false },
    "httpx.AsyncClient" => Role::HttpClient { library: Cow::Borrowed("httpx"), is_async: true },
    "requests.Session" => Role::HttpClient { library: Cow::Borrowed("requests"), is_async: false },
    "requests.session" => Role::HttpClient { library: Cow::Borrowed("requests"), is_async: false },
    "requests.sessions.Session" => Role::HttpClient { library: Cow::Borrowed("requests"), is_async: false },
    "aiohttp.ClientSession" => Role::HttpClient { library: Cow::Borrowed("aiohttp"), is_async: true },
    "aiohttp.client.ClientSession" => Role::HttpClient { library: Cow::Borrowed("aiohttp"), is_async: true },
    "urllib3.PoolManager" => Role::HttpClient { library: Cow::Borrowed("urllib3"), is_async: false },
    "fastapi.FastAPI" => Role::RouteGroup { framework: Framework::FastApi, kind: GroupKind::Application },
    "fastapi.applications.FastAPI" => Role::RouteGroup { framework: Framework::FastApi, kind: GroupKind::Application },
    "fastapi.APIRouter" => Role::RouteGroup { framework: Framework::FastApi, kind: GroupKind::Router },
    "fastapi.routing.APIRouter" => Role::RouteGroup { framework: Framework::FastApi, kind: GroupKind::Router },
    "flask.Flask" => Role::RouteGroup { framework: Framework::Flask, kind: GroupKind::Application },
    "flask.Blueprint" => Role::RouteGroup { framework: Framework::Flask, kind: GroupKind::Blueprint },
    "flask.blueprints.Blueprint" => Role::RouteGroup { framework: Framework::Flask, kind: GroupKind::Blueprint },
    "mcp.server.Server" => Role::ToolServer { framework: Cow::Borrowed("mcp") },
    "mcp.server.lowlevel.Server" => Role::ToolServer { framework: Cow::Borrowed("mcp") },
    "mcp.server.fastmcp.FastMCP" => Role::ToolServer { framework: Cow::Borrowed("mcp") },
    "fastmcp.FastMCP" => Role::ToolServer { framework: Cow::Borrowed("fastmcp") },
};

/// Modules whose top-level functions issue requests.
static HTTP_MODULES: phf::Map<&'static str, &'static str> = phf_map! {
    "requests" => "requests",
    "requests.api" => "requests",
    "httpx" => "httpx",
};

static METHOD_NAMES: phf::Map<&'static str, HttpMethod> = phf_map! {
    "get" => HttpMethod::Get,
    "post" => HttpMethod::Post,
    "put" => HttpMethod::Put,
    "patch" => HttpMethod::Patch,
    "delete" => HttpMethod::Delete,
    "head" => HttpMethod::Head,
    "options" => HttpMethod::Options,
};

/// Methods whose HTTP verb is an argument.
static GENERIC_REQUEST_METHODS: phf::Set<&'static str> = phf_set! {
    "request",
    "stream",
};

static OPTION_KEYWORDS: phf::Map<&'static str, OptionKind> = phf_map! {
    "json" => OptionKind::Json,
    "params" => OptionKind::Params,
    "headers" => OptionKind::Headers,
    "timeout" => OptionKind::Timeout,
    "data" => OptionKind::Data,
    "content" => OptionKind::Data,
    "auth" => OptionKind::Auth,
    "cookies" => OptionKind::Cookies,
    "files" => OptionKind::Files,
};

/// Route decorators; `None` means the methods come from arguments.
static FASTAPI_ROUTE_DECORATORS: phf::Map<&'static str, Option<HttpMethod>> = phf_map! {
    "get" => Some(HttpMethod::Get),
    "post" => Some(HttpMethod::Post),
    "put" => Some(HttpMethod::Put),
    "patch" => Some(HttpMethod::Patch),
    "delete" => Some(HttpMethod::Delete),
    "head" => Some(HttpMethod::Head),
    "options" => Some(HttpMethod::Options),
    "trace" => Some(HttpMethod::Trace),
    "api_route" => None,
};

static FLASK_ROUTE_DECORATORS: phf::Map<&'static str, Option<HttpMethod>> = phf_map! {
    "route" => None,
    "get" => Some(HttpMethod::Get),
    "post" => Some(HttpMethod::Post),
    "put" => Some(HttpMethod::Put),
    "patch" => Some(HttpMethod::Patch),
    "delete" => Some(HttpMethod::Delete),
};

/// Argument layout of an imperative route registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationCall {
    pub path_keyword: &'static str,
    pub handler_index: usize,
    pub handler_keyword: &'static str,
}

static REGISTRATION_CALLS: phf::Map<&'static str, RegistrationCall> = phf_map! {
    "add_url_rule" => RegistrationCall { path_keyword: "rule", handler_index: 2, handler_keyword: "view_func" },
    "add_api_route" => RegistrationCall { path_keyword: "path", handler_index: 1, handler_keyword: "endpoint" },
    "add_route" => RegistrationCall { path_keyword: "path", handler_index: 1, handler_keyword: "route" },
};

/// Argument layout of a group include call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeCall {
    pub target_index: usize,
    pub target_keyword: &'static str,
    pub prefix_index: Option<usize>,
    pub prefix_keyword: &'static str,
    /// The prefix replaces the child's declared prefix instead of stacking.
    pub replaces_prefix: bool,
}

static INCLUDE_CALLS: phf::Map<&'static str, IncludeCall> = phf_map! {
    "include_router" => IncludeCall {
        target_index: 0, target_keyword: "router", prefix_index: None, prefix_keyword: "prefix", replaces_prefix: false,
    },
    "register_blueprint" => IncludeCall {
        target_index: 0, target_keyword: "blueprint", prefix_index: None, prefix_keyword: "url_prefix", replaces_prefix: true,
    },
    "mount" => IncludeCall {
        target_index: 1, target_keyword: "app", prefix_index: Some(0), prefix_keyword: "path", replaces_prefix: false,
    },
};

static PARAMETER_MARKERS: phf::Map<&'static str, ParameterSource> = phf_map! {
    "fastapi.Query" => ParameterSource::Query,
    "fastapi.Path" => ParameterSource::Path,
    "fastapi.Body" => ParameterSource::Body,
    "fastapi.Form" => ParameterSource::Body,
    "fastapi.File" => ParameterSource::Body,
    "fastapi.Header" => ParameterSource::Header,
    "fastapi.Cookie" => ParameterSource::Cookie,
    "fastapi.Depends" => ParameterSource::Dependency,
    "fastapi.Security" => ParameterSource::Dependency,
    "fastapi.params.Query" => ParameterSource::Query,
    "fastapi.params.Path" => ParameterSource::Path,
    "fastapi.params.Body" => ParameterSource::Body,
    "fastapi.params.Form" => ParameterSource::Body,
    "fastapi.params.File" => ParameterSource::Body,
    "fastapi.params.Header" => ParameterSource::Header,
    "fastapi.params.Cookie" => ParameterSource::Cookie,
    "fastapi.params.Depends" => ParameterSource::Dependency,
    "fastapi.params.Security" => ParameterSource::Dependency,
};

static MODEL_BASES: phf::Map<&'static str, SchemaKind> = phf_map! {
    "pydantic.BaseModel" => SchemaKind::Pydantic,
    "pydantic.main.BaseModel" => SchemaKind::Pydantic,
    "pydantic.v1.BaseModel" => SchemaKind::Pydantic,
    "pydantic.RootModel" => SchemaKind::Pydantic,
    "pydantic.BaseSettings" => SchemaKind::Pydantic,
    "pydantic.generics.GenericModel" => SchemaKind::Pydantic,
    "pydantic_settings.BaseSettings" => SchemaKind::Pydantic,
    "sqlmodel.SQLModel" => SchemaKind::Pydantic,
    "typing.TypedDict" => SchemaKind::TypedDict,
    "typing_extensions.TypedDict" => SchemaKind::TypedDict,
    "mypy_extensions.TypedDict" => SchemaKind::TypedDict,
    "typing.NamedTuple" => SchemaKind::NamedTuple,
};

static MODEL_DECORATORS: phf::Set<&'static str> = phf_set! {
    "dataclasses.dataclass",
    "pydantic.dataclasses.dataclass",
};

static FIELD_FACTORIES: phf::Set<&'static str> = phf_set! {
    "pydantic.Field",
    "pydantic.fields.Field",
    "sqlmodel.Field",
    "dataclasses.field",
};

static ENUM_BASES: phf::Set<&'static str> = phf_set! {
    "enum.Enum",
    "enum.IntEnum",
    "enum.StrEnum",
    "enum.Flag",
    "enum.IntFlag",
};

/// Validator decorators by their final name; the value is the validator kind.
static VALIDATOR_DECORATORS: phf::Map<&'static str, &'static str> = phf_map! {
    "validator" => "field",
    "field_validator" => "field",
    "root_validator" => "model",
    "model_validator" => "model",
};

static TOOL_DECORATORS: phf::Map<&'static str, ToolKind> = phf_map! {
    "tool" => ToolKind::Tool,
    "resource" => ToolKind::Resource,
    "prompt" => ToolKind::Prompt,
};

pub fn method_for_name(name: &str) -> Option<HttpMethod> {
    METHOD_NAMES.get(name).copied()
}

pub fn is_generic_request_method(name: &str) -> bool {
    GENERIC_REQUEST_METHODS.contains(name)
}

pub fn option_kind(keyword: &str) -> Option<OptionKind> {
    OPTION_KEYWORDS.get(keyword).copied()
}

/// Look up a route decorator name for a framework.
///
/// The outer `None` means "not a route decorator"; the inner one means the
/// methods come from the decorator's arguments.
pub fn route_decorator(framework: Framework, name: &str) -> Option<Option<HttpMethod>> {
    match framework {
        Framework::FastApi => FASTAPI_ROUTE_DECORATORS.get(name).copied(),
        Framework::Flask => FLASK_ROUTE_DECORATORS.get(name).copied(),
    }
}

pub fn registration_call(name: &str) -> Option<RegistrationCall> {
    REGISTRATION_CALLS.get(name).copied()
}

pub fn include_call(name: &str) -> Option<IncludeCall> {
    INCLUDE_CALLS.get(name).copied()
}

pub fn parameter_marker(path: &str) -> Option<ParameterSource> {
    PARAMETER_MARKERS.get(path).copied()
}

pub fn is_model_decorator(path: &str) -> bool {
    MODEL_DECORATORS.contains(path)
}

pub fn is_field_factory(path: &str) -> bool {
    FIELD_FACTORIES.contains(path)
}

pub fn is_enum_base(path: &str) -> bool {
    ENUM_BASES.contains(path)
}

/// Validator kind for a decorator path, matched on its final segment.
pub fn validator_kind(path: &str) -> Option<&'static str> {
    let last = path.rsplit('.').next().unwrap_or(path);
    VALIDATOR_DECORATORS.get(last).copied()
}

pub fn tool_decorator(name: &str) -> Option<ToolKind> {
    TOOL_DECORATORS.get(name).copied()
}

/// Static tables plus project-specific extensions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    constructors: HashMap<String, Role>,
    http_modules: HashMap<String, String>,
    model_bases: HashMap<String, SchemaKind>,
}

impl Catalog {
    /// The built-in tables only.
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn add_constructor(&mut self, path: impl Into<String>, role: Role) {
        self.constructors.insert(path.into(), role);
    }

    pub fn add_http_module(&mut self, module: impl Into<String>, library: impl Into<String>) {
        self.http_modules.insert(module.into(), library.into());
    }

    pub fn add_model_base(&mut self, path: impl Into<String>, kind: SchemaKind) {
        self.model_bases.insert(path.into(), kind);
    }

    /// Role of the object a call to `path` produces.
    pub fn constructor_role(&self, path: &str) -> Option<Role> {
        if let Some(role) = self.constructors.get(path) {
            return Some(role.clone());
        }
        let role = CONSTRUCTORS.get(path).cloned();
        if role.is_none() {
            tracing::trace!(path, "not a catalog constructor");
        }
        role
    }

    /// Library name when `module` is an HTTP module (`requests`, `httpx`).
    pub fn http_module(&self, module: &str) -> Option<&str> {
        self.http_modules
            .get(module)
            .map(String::as_str)
            .or_else(|| HTTP_MODULES.get(module).copied())
    }

    pub fn model_base(&self, path: &str) -> Option<SchemaKind> {
        self.model_bases
            .get(path)
            .copied()
            .or_else(|| MODEL_BASES.get(path).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_constructors() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.constructor_role("httpx.AsyncClient"),
            Some(Role::HttpClient {
                library: Cow::Borrowed("httpx"),
                is_async: true
            })
        );
        assert_eq!(
            catalog.constructor_role("flask.Blueprint"),
            Some(Role::RouteGroup {
                framework: Framework::Flask,
                kind: GroupKind::Blueprint
            })
        );
        assert_eq!(catalog.constructor_role("collections.OrderedDict"), None);
    }

    #[test]
    fn test_extensions_take_precedence() {
        let mut catalog = Catalog::builtin();
        catalog.add_constructor(
            "company.http.Client",
            Role::HttpClient {
                library: Cow::Owned("company".to_string()),
                is_async: false,
            },
        );
        catalog.add_http_module("company.http", "company");
        catalog.add_model_base("company.models.Base", SchemaKind::Pydantic);

        assert!(matches!(
            catalog.constructor_role("company.http.Client"),
            Some(Role::HttpClient { .. })
        ));
        assert_eq!(catalog.http_module("company.http"), Some("company"));
        assert_eq!(catalog.http_module("requests"), Some("requests"));
        assert_eq!(
            catalog.model_base("company.models.Base"),
            Some(SchemaKind::Pydantic)
        );
    }

    #[test]
    fn test_route_decorators() {
        assert_eq!(
            route_decorator(Framework::FastApi, "post"),
            Some(Some(HttpMethod::Post))
        );
        assert_eq!(route_decorator(Framework::Flask, "route"), Some(None));
        assert_eq!(route_decorator(Framework::Flask, "errorhandler"), None);
        assert_eq!(route_decorator(Framework::FastApi, "middleware"), None);
    }

    #[test]
    fn test_validator_kind_uses_last_segment() {
        assert_eq!(validator_kind("pydantic.field_validator"), Some("field"));
        assert_eq!(validator_kind("model_validator"), Some("model"));
        assert_eq!(validator_kind("pydantic.Field"), None);
    }
}
