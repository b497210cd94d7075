//! MCP tool, resource and prompt signatures.

use std::collections::BTreeSet;

use phf::phf_set;

use crate::analysis::facts::{Degradation, ServerRef, ToolParameter, ToolSignatureFact};
use crate::parser::Node;

use super::bindings::{parameter_parts, unwrap_type};
use super::catalog::{self, Role};
use super::docstring::{docstring_of, parse as parse_docstring};
use super::values::{default_summary, string_literal, unwrap_parens, CallArgs};
use super::FileContext;

/// Parameters the server injects into a tool call.
static CONTEXT_TYPES: phf::Set<&'static str> = phf_set! {
    "mcp.server.fastmcp.Context",
    "mcp.server.fastmcp.server.Context",
    "fastmcp.Context",
    "fastmcp.server.Context",
};

pub fn extract(cx: &FileContext<'_>) -> Vec<ToolSignatureFact> {
    let mut tools = Vec::new();
    for decorated in cx
        .tree
        .root()
        .descendants()
        .filter(|n| n.kind() == "decorated_definition")
    {
        let Some(function) = decorated
            .child_by_field("definition")
            .filter(|d| d.kind() == "function_definition")
        else {
            continue;
        };
        let Some(definition) = cx.table.definition_of(function) else {
            continue;
        };
        for decorator in definition.registrations.iter().map(|&id| cx.tree.node(id)) {
            if let Some(tool) = tool_from_decorator(cx, decorated, function, decorator) {
                tools.push(tool);
            }
        }
    }
    tools
}

fn tool_from_decorator(
    cx: &FileContext<'_>,
    decorated: Node<'_>,
    function: Node<'_>,
    decorator: Node<'_>,
) -> Option<ToolSignatureFact> {
    let expr = unwrap_parens(decorator.named_children().next()?);
    let (target, call) = if expr.kind() == "call" {
        (unwrap_parens(expr.child_by_field("function")?), Some(expr))
    } else {
        (expr, None)
    };
    if target.kind() != "attribute" {
        return None;
    }
    let kind = catalog::tool_decorator(target.child_by_field("attribute")?.text())?;
    let instance = cx
        .table
        .resolve_instance(target.child_by_field("object")?, cx.catalog)?;
    if !matches!(instance.role, Role::ToolServer { .. }) {
        return None;
    }

    let server_name = instance
        .origin
        .map(|o| cx.tree.node(o))
        .filter(|o| o.kind() == "call")
        .and_then(|o| CallArgs::of(o).arg(0, "name"))
        .and_then(string_literal);
    let server = ServerRef {
        variable: instance.variable.clone().unwrap_or_default(),
        constructor: instance.constructor.clone(),
        name: server_name,
    };

    let args = call.map(CallArgs::of).unwrap_or_default();
    let function_name = function.child_by_field("name")?.text().to_string();
    let doc = function
        .child_by_field("body")
        .and_then(docstring_of)
        .map(|text| parse_docstring(&text))
        .unwrap_or_default();

    let mut degradations = BTreeSet::new();
    let parameters = parameters(cx, function, &doc.params, &mut degradations);
    let normalizer = cx.normalizer();

    Some(ToolSignatureFact {
        file: cx.file.to_string(),
        span: decorated.span(),
        name: args
            .keyword("name")
            .and_then(string_literal)
            .unwrap_or_else(|| function_name.clone()),
        function: function_name,
        kind,
        uri: args.arg(0, "uri").and_then(string_literal),
        is_async: function.has_token("async"),
        parameters,
        return_type: function
            .child_by_field("return_type")
            .map(|r| normalizer.normalize(r)),
        summary: doc.summary.clone(),
        description: args
            .keyword("description")
            .and_then(string_literal)
            .or(doc.description.clone()),
        doc_params: doc.params.clone(),
        returns_doc: doc.returns.clone(),
        server,
        degradations,
    })
}

fn parameters(
    cx: &FileContext<'_>,
    function: Node<'_>,
    doc_params: &std::collections::BTreeMap<String, String>,
    degradations: &mut BTreeSet<Degradation>,
) -> Vec<ToolParameter> {
    let Some(list) = function.child_by_field("parameters") else {
        return Vec::new();
    };
    let normalizer = cx.normalizer();
    let mut out = Vec::new();
    for param in list.named_children() {
        let Some((name, annotation)) = parameter_parts(param) else {
            continue;
        };
        let name = name.text();
        if name == "self" || name == "cls" {
            continue;
        }
        let injected = annotation
            .and_then(|a| cx.table.qualify(unwrap_type(a)))
            .map(|p| CONTEXT_TYPES.contains(p.as_str()))
            .unwrap_or(false);
        if injected {
            continue;
        }

        let ty = annotation
            .map(|a| normalizer.normalize(a))
            .unwrap_or_else(crate::analysis::types::TypeInfo::unknown);
        if ty.descriptor.is_unknown() {
            degradations.insert(Degradation::UnknownType);
        }
        let default = param.child_by_field("value");
        out.push(ToolParameter {
            name: name.to_string(),
            ty,
            required: default.is_none(),
            default: default.map(default_summary),
            description: doc_params.get(name).cloned(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::facts::ToolKind;
    use crate::analysis::languages::python::test_support::with_context;
    use crate::analysis::types::TypeDescriptor;

    const SERVER: &str = r#"
from typing import Optional, List
from mcp.server import Server
from mcp.server.fastmcp import FastMCP, Context

mcp = Server("sample-mcp-server")
fast = FastMCP(name="fast")

@mcp.tool()
async def search(query: str, limit: Optional[int] = 10) -> List[str]:
    """Search documents.

    Full-text search across the index.

    Args:
        query: Text to search for.
        limit: Maximum results.

    Returns:
        Matching document ids.
    """
    pass

@fast.resource("config://{section}")
def config(section: str, ctx: Context) -> str:
    pass

@fast.prompt
def greet(name):
    pass

@mcp.tool(name="renamed", description="Custom description")
def original():
    pass
"#;

    #[test]
    fn test_tool_signatures() {
        let tools = with_context(SERVER, extract);
        assert_eq!(tools.len(), 4);

        let search = &tools[0];
        assert_eq!(search.kind, ToolKind::Tool);
        assert_eq!(search.name, "search");
        assert!(search.is_async);
        assert_eq!(search.server.variable, "mcp");
        assert_eq!(search.server.name.as_deref(), Some("sample-mcp-server"));
        assert_eq!(search.summary.as_deref(), Some("Search documents."));
        assert_eq!(
            search.description.as_deref(),
            Some("Full-text search across the index.")
        );
        assert_eq!(search.returns_doc.as_deref(), Some("Matching document ids."));
        assert_eq!(search.parameters.len(), 2);
        assert!(search.parameters[0].required);
        assert_eq!(search.parameters[0].description.as_deref(), Some("Text to search for."));
        assert!(!search.parameters[1].required);
        assert_eq!(search.parameters[1].default.as_deref(), Some("10"));
        assert_eq!(
            search.parameters[1].ty.descriptor,
            TypeDescriptor::optional(TypeDescriptor::primitive("int"))
        );
        assert_eq!(
            search.return_type.as_ref().map(|t| &t.descriptor),
            Some(&TypeDescriptor::list(TypeDescriptor::primitive("string")))
        );

        let config = &tools[1];
        assert_eq!(config.kind, ToolKind::Resource);
        assert_eq!(config.uri.as_deref(), Some("config://{section}"));
        assert_eq!(config.parameters.len(), 1);
        assert_eq!(config.server.name.as_deref(), Some("fast"));

        let greet = &tools[2];
        assert_eq!(greet.kind, ToolKind::Prompt);
        assert!(greet.degradations.contains(&Degradation::UnknownType));

        let renamed = &tools[3];
        assert_eq!(renamed.name, "renamed");
        assert_eq!(renamed.function, "original");
        assert_eq!(renamed.description.as_deref(), Some("Custom description"));
    }

    #[test]
    fn test_other_decorators_are_ignored() {
        let tools = with_context(
            "import pytest\n@pytest.fixture\ndef tool():\n    pass\n@registry.tool()\ndef other():\n    pass\n",
            extract,
        );
        assert!(tools.is_empty());
    }
}
