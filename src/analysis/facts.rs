//! Fact structures extracted from AST analysis.
//!
//! Every fact is an immutable value carrying its file label, source span and
//! the set of fields that degraded to "unknown" during extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

pub use crate::parser::Span;

use super::types::{LiteralValue, TypeInfo};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Parse a method name in any letter case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            "TRACE" => Some(HttpMethod::Trace),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field of a fact that could not be determined statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    UnknownUrl,
    UnknownMethod,
    UnknownPath,
    UnknownType,
    UnknownHandler,
    UnresolvedGroup,
    TypeConflict,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::UnknownUrl => "unknown_url",
            Degradation::UnknownMethod => "unknown_method",
            Degradation::UnknownPath => "unknown_path",
            Degradation::UnknownType => "unknown_type",
            Degradation::UnknownHandler => "unknown_handler",
            Degradation::UnresolvedGroup => "unresolved_group",
            Degradation::TypeConflict => "type_conflict",
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type Degradations = BTreeSet<Degradation>;

// =============================================================================
// HTTP calls
// =============================================================================

/// One piece of a templated URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlSegment {
    Literal { text: String },
    /// An interpolated or concatenated expression, kept as source text.
    Slot { expr: String },
}

/// Statically captured URL argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlExpression {
    Literal { value: String },
    Templated { segments: Vec<UrlSegment> },
    Unknown { expr: String },
}

impl UrlExpression {
    pub fn is_unknown(&self) -> bool {
        matches!(self, UrlExpression::Unknown { .. })
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            UrlExpression::Literal { value } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for UrlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlExpression::Literal { value } => write!(f, "{}", value),
            UrlExpression::Templated { segments } => {
                for segment in segments {
                    match segment {
                        UrlSegment::Literal { text } => write!(f, "{}", text)?,
                        UrlSegment::Slot { expr } => write!(f, "{{{}}}", expr)?,
                    }
                }
                Ok(())
            }
            UrlExpression::Unknown { expr } => write!(f, "<{}>", expr),
        }
    }
}

/// Recognized keyword options on a request call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Json,
    Params,
    Headers,
    Timeout,
    Data,
    Auth,
    Cookies,
    Files,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::Json => "json",
            OptionKind::Params => "params",
            OptionKind::Headers => "headers",
            OptionKind::Timeout => "timeout",
            OptionKind::Data => "data",
            OptionKind::Auth => "auth",
            OptionKind::Cookies => "cookies",
            OptionKind::Files => "files",
        }
    }
}

/// How the call reached its HTTP library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallConvention {
    /// `requests.get(...)`
    ModuleFunction,
    /// `session.get(...)` on a previously bound client.
    BoundClient,
    /// A client bound by `with` / `async with`.
    ScopedClient,
    /// `httpx.Client().get(...)`
    InlineClient,
}

/// The client object a bound call goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub constructor: String,
    pub span: Span,
}

/// An outbound HTTP request site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpCallFact {
    pub file: String,
    pub span: Span,
    pub library: String,
    pub method: Option<HttpMethod>,
    pub url: UrlExpression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<UrlExpression>,
    pub options: BTreeSet<OptionKind>,
    /// Literal dictionary keys per option (`headers={"Accept": ...}`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub option_keys: BTreeMap<OptionKind, Vec<String>>,
    pub convention: CallConvention,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientBinding>,
    pub is_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_variable: Option<String>,
    /// Attributes read from the response later in the same scope.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_usage: Vec<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub degradations: Degradations,
}

// =============================================================================
// Routes
// =============================================================================

/// Web framework that declared a route or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Framework {
    #[serde(rename = "fastapi")]
    FastApi,
    #[serde(rename = "flask")]
    Flask,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::FastApi => "fastapi",
            Framework::Flask => "flask",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a route parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Path,
    Query,
    Body,
    Header,
    Cookie,
    Dependency,
}

impl ParameterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterSource::Path => "path",
            ParameterSource::Query => "query",
            ParameterSource::Body => "body",
            ParameterSource::Header => "header",
            ParameterSource::Cookie => "cookie",
            ParameterSource::Dependency => "dependency",
        }
    }
}

/// Validation constraints declared through markers, `Field(...)` or
/// constrained types.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ge: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<serde_json::Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<LiteralValue>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    /// Fill unset fields from `other`.
    pub fn merge_missing(&mut self, other: &Constraints) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        fill(&mut self.gt, &other.gt);
        fill(&mut self.ge, &other.ge);
        fill(&mut self.lt, &other.lt);
        fill(&mut self.le, &other.le);
        fill(&mut self.multiple_of, &other.multiple_of);
        fill(&mut self.min_length, &other.min_length);
        fill(&mut self.max_length, &other.max_length);
        fill(&mut self.pattern, &other.pattern);
        if self.enum_values.is_empty() {
            self.enum_values = other.enum_values.clone();
        }
    }
}

/// A parameter of a route handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteParameter {
    pub name: String,
    pub source: ParameterSource,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    /// The annotation, when it disagreed with the marker's explicit type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_conflict: Option<TypeInfo>,
}

/// Extra documented response for a route (`responses={404: {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<TypeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Decorator metadata for a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteMetadata {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, ResponseInfo>,
}

/// How a route was attached to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStyle {
    Decorator,
    Call,
}

/// Identity of a route group: the binding that declared it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub file: String,
    pub name: String,
    pub offset: usize,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file, self.name)
    }
}

/// An inbound HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteFact {
    pub file: String,
    pub span: Span,
    pub framework: Framework,
    pub handler: String,
    pub is_async: bool,
    pub methods: Vec<HttpMethod>,
    pub raw_path: Option<String>,
    /// Raw path joined with every enclosing group prefix.
    pub effective_path: Option<String>,
    pub parameters: Vec<RouteParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<TypeInfo>,
    pub metadata: RouteMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupKey>,
    pub style: RegistrationStyle,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub degradations: Degradations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Application,
    Router,
    Blueprint,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Application => "application",
            GroupKind::Router => "router",
            GroupKind::Blueprint => "blueprint",
        }
    }
}

/// Where a group sits after include resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Not included anywhere.
    Root,
    /// Included under a parent that resolved.
    Linked,
    /// On or below an include cycle; only its own prefix applies.
    Cyclic,
}

/// A router, blueprint or application object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteGroupFact {
    pub key: GroupKey,
    pub span: Span,
    pub framework: Framework,
    pub kind: GroupKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<GroupKey>,
    /// Prefix added by the include edge (`include_router(r, prefix=...)`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_prefix: Option<String>,
    pub status: GroupStatus,
    pub members: Vec<Span>,
}

/// What an include call points at, as far as one file can tell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncludeTarget {
    Local { key: GroupKey },
    Imported { module: String, name: String },
    Unknown { expr: String },
}

/// `include_router` / `register_blueprint` / `mount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInclude {
    pub file: String,
    pub span: Span,
    pub method: String,
    pub parent: GroupKey,
    pub target: IncludeTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Flask `url_prefix` on registration overrides the blueprint's own.
    pub replaces_prefix: bool,
}

// =============================================================================
// Schemas
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Pydantic,
    TypedDict,
    NamedTuple,
    Dataclass,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Pydantic => "pydantic",
            SchemaKind::TypedDict => "typed_dict",
            SchemaKind::NamedTuple => "named_tuple",
            SchemaKind::Dataclass => "dataclass",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    /// Declaring base class for inherited fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

/// Model configuration flags (`class Config`, `model_config`, class kwargs).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaConfig {
    pub frozen: bool,
    pub populate_by_name: bool,
    pub use_enum_values: bool,
    pub from_attributes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub method: String,
    /// `field` or `model`.
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// A base class as written, with enough context to find it in the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRef {
    /// Source text (`BaseModel`, `models.Base`).
    pub written: String,
    /// Class name to look up (last dotted segment, or the imported original name).
    pub symbol: String,
    /// Module the name was imported from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Fully qualified import path, when the name came through an import.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified: Option<String>,
}

/// Every class seen in pass 1, model or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: String,
    pub span: Span,
    pub bases: Vec<BaseRef>,
    /// Set when the class is recognized without looking at other classes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_kind: Option<SchemaKind>,
    pub is_enum: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<LiteralValue>,
    pub type_params: Vec<String>,
    pub fields: Vec<SchemaField>,
    pub config: SchemaConfig,
    pub validators: Vec<Validator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// A data-shape declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaFact {
    pub file: String,
    pub span: Span,
    pub name: String,
    pub kind: SchemaKind,
    pub bases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
    pub fields: Vec<SchemaField>,
    pub config: SchemaConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub degradations: Degradations,
}

// =============================================================================
// Tools
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Tool,
    Resource,
    Prompt,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Tool => "tool",
            ToolKind::Resource => "resource",
            ToolKind::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The server object a tool is registered on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRef {
    pub variable: String,
    pub constructor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A callable exposed to tool-using clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSignatureFact {
    pub file: String,
    pub span: Span,
    pub name: String,
    pub function: String,
    pub kind: ToolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub is_async: bool,
    pub parameters: Vec<ToolParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub doc_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns_doc: Option<String>,
    pub server: ServerRef,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub degradations: Degradations,
}

// =============================================================================
// Per-file container
// =============================================================================

/// All facts extracted from a single file in pass 1.
#[derive(Debug, Clone, Serialize)]
pub struct FileFacts {
    /// File label.
    pub path: String,
    /// Language identifier.
    pub language: String,
    /// Dotted module name supplied by the host (for import matching).
    pub module: Option<String>,
    pub http_calls: Vec<HttpCallFact>,
    pub routes: Vec<RouteFact>,
    pub groups: Vec<RouteGroupFact>,
    pub includes: Vec<GroupInclude>,
    pub classes: Vec<ClassDecl>,
    pub tools: Vec<ToolSignatureFact>,
    /// Whether the file had parse errors.
    pub has_parse_errors: bool,
}

impl FileFacts {
    /// Create empty facts for a file.
    pub fn empty(path: &str, language: &str) -> Self {
        Self {
            path: path.to_string(),
            language: language.to_string(),
            module: None,
            http_calls: Vec::new(),
            routes: Vec::new(),
            groups: Vec::new(),
            includes: Vec::new(),
            classes: Vec::new(),
            tools: Vec::new(),
            has_parse_errors: false,
        }
    }

    pub fn fact_count(&self) -> usize {
        self.http_calls.len() + self.routes.len() + self.tools.len()
    }
}
