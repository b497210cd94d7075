//! Configuration file for apiscan.
//!
//! `apiscan.yaml` controls file discovery and extends the recognition
//! catalog with project-specific constructors and model bases.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::facts::{Framework, GroupKind, SchemaKind};
use crate::analysis::{Catalog, Role};

/// Config file names searched for, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["apiscan.yaml", ".apiscan.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid excluded_paths pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("unknown {field} {value:?} for {entry}")]
    UnknownRole {
        entry: String,
        field: &'static str,
        value: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub version: String,
    /// Whether to scan test files and directories (default: false)
    #[serde(default)]
    pub include_test_files: Option<bool>,
    /// Glob patterns for paths to exclude (e.g., "**/migrations/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Additions to the built-in recognition tables.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub http_clients: Vec<HttpClientEntry>,
    #[serde(default)]
    pub http_modules: Vec<HttpModuleEntry>,
    #[serde(default)]
    pub route_groups: Vec<RouteGroupEntry>,
    #[serde(default)]
    pub tool_servers: Vec<ToolServerEntry>,
    #[serde(default)]
    pub model_bases: Vec<ModelBaseEntry>,
}

/// A constructor whose instances issue HTTP requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpClientEntry {
    pub constructor: String,
    pub library: String,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

/// A module whose top-level functions issue HTTP requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpModuleEntry {
    pub module: String,
    pub library: String,
}

/// A constructor producing an application, router or blueprint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteGroupEntry {
    pub constructor: String,
    /// "fastapi" or "flask"
    pub framework: String,
    /// "application", "router" or "blueprint"
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolServerEntry {
    pub constructor: String,
    #[serde(default = "default_tool_framework")]
    pub framework: String,
}

fn default_tool_framework() -> String {
    "mcp".to_string()
}

/// A base class that makes its subclasses schemas.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelBaseEntry {
    pub path: String,
    /// "pydantic" (default), "typed_dict", "named_tuple" or "dataclass"
    #[serde(default)]
    pub kind: Option<String>,
}

fn parse_framework(entry: &str, value: &str) -> Result<Framework, ConfigError> {
    match value {
        "fastapi" | "starlette" => Ok(Framework::FastApi),
        "flask" => Ok(Framework::Flask),
        _ => Err(ConfigError::UnknownRole {
            entry: entry.to_string(),
            field: "framework",
            value: value.to_string(),
        }),
    }
}

fn parse_group_kind(entry: &str, value: &str) -> Result<GroupKind, ConfigError> {
    match value {
        "application" | "app" => Ok(GroupKind::Application),
        "router" => Ok(GroupKind::Router),
        "blueprint" => Ok(GroupKind::Blueprint),
        _ => Err(ConfigError::UnknownRole {
            entry: entry.to_string(),
            field: "kind",
            value: value.to_string(),
        }),
    }
}

fn parse_schema_kind(entry: &str, value: Option<&str>) -> Result<SchemaKind, ConfigError> {
    match value.unwrap_or("pydantic") {
        "pydantic" => Ok(SchemaKind::Pydantic),
        "typed_dict" => Ok(SchemaKind::TypedDict),
        "named_tuple" => Ok(SchemaKind::NamedTuple),
        "dataclass" => Ok(SchemaKind::Dataclass),
        other => Err(ConfigError::UnknownRole {
            entry: entry.to_string(),
            field: "kind",
            value: other.to_string(),
        }),
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Returns whether to include test files (defaults to false).
    pub fn should_include_test_files(&self) -> bool {
        self.include_test_files.unwrap_or(false)
    }

    /// Compile `excluded_paths` into one matcher.
    pub fn exclusions(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|source| ConfigError::Glob {
            pattern: self.excluded_paths.join(", "),
            source,
        })
    }

    /// Built-in catalog plus the entries of this config.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let mut catalog = Catalog::builtin();
        let entries = &self.catalog;

        for client in &entries.http_clients {
            catalog.add_constructor(
                client.constructor.clone(),
                Role::HttpClient {
                    library: client.library.clone().into(),
                    is_async: client.is_async,
                },
            );
        }
        for module in &entries.http_modules {
            catalog.add_http_module(module.module.clone(), module.library.clone());
        }
        for group in &entries.route_groups {
            let framework = parse_framework(&group.constructor, &group.framework)?;
            let kind = parse_group_kind(&group.constructor, &group.kind)?;
            catalog.add_constructor(group.constructor.clone(), Role::RouteGroup { framework, kind });
        }
        for server in &entries.tool_servers {
            catalog.add_constructor(
                server.constructor.clone(),
                Role::ToolServer {
                    framework: server.framework.clone().into(),
                },
            );
        }
        for base in &entries.model_bases {
            let kind = parse_schema_kind(&base.path, base.kind.as_deref())?;
            catalog.add_model_base(base.path.clone(), kind);
        }
        Ok(catalog)
    }
}

/// Validate a config.
///
/// Checks that exclusion globs compile and every catalog entry names a known
/// framework and kind.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    config.exclusions()?;
    config.catalog()?;
    Ok(())
}
