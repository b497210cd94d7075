//! Outbound HTTP call-site classification.

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::facts::{
    CallConvention, ClientBinding, Degradation, HttpCallFact, HttpMethod, OptionKind,
    UrlExpression, UrlSegment,
};
use crate::parser::Node;

use super::bindings::Binding;
use super::catalog::{self, Role};
use super::values::{
    dict_keys, push_literal, string_literal, string_template, unwrap_await, unwrap_parens,
    CallArgs,
};
use super::FileContext;

/// Every HTTP request call in the file, in source order.
pub fn extract(cx: &FileContext<'_>) -> Vec<HttpCallFact> {
    cx.tree
        .root()
        .descendants()
        .filter(|n| n.kind() == "call")
        .filter_map(|call| classify(cx, call))
        .collect()
}

struct Target {
    library: String,
    method_name: String,
    convention: CallConvention,
    client: Option<ClientBinding>,
    base_url: Option<UrlExpression>,
    is_async: bool,
}

fn is_request_method(name: &str) -> bool {
    catalog::method_for_name(name).is_some() || catalog::is_generic_request_method(name)
}

fn classify(cx: &FileContext<'_>, call: Node<'_>) -> Option<HttpCallFact> {
    let function = unwrap_parens(call.child_by_field("function")?);
    let target = module_function(cx, function).or_else(|| bound_method(cx, function))?;
    Some(build_fact(cx, call, target))
}

/// `requests.get(...)`, `from httpx import post; post(...)`.
fn module_function(cx: &FileContext<'_>, function: Node<'_>) -> Option<Target> {
    let path = cx.table.qualify(function)?;
    let (module, name) = path.rsplit_once('.')?;
    if !is_request_method(name) {
        return None;
    }
    let library = cx.catalog.http_module(module)?;
    Some(Target {
        library: library.to_string(),
        method_name: name.to_string(),
        convention: CallConvention::ModuleFunction,
        client: None,
        base_url: None,
        is_async: false,
    })
}

/// `client.get(...)` on a bound, scoped or inline client.
fn bound_method(cx: &FileContext<'_>, function: Node<'_>) -> Option<Target> {
    if function.kind() != "attribute" {
        return None;
    }
    let name = function.child_by_field("attribute")?.text();
    if !is_request_method(name) {
        return None;
    }
    let object = function.child_by_field("object")?;
    let instance = cx.table.resolve_instance(object, cx.catalog)?;
    let Role::HttpClient { library, is_async } = &instance.role else {
        return None;
    };

    let convention = if unwrap_await(object).kind() == "call" {
        CallConvention::InlineClient
    } else if instance.scoped {
        CallConvention::ScopedClient
    } else {
        CallConvention::BoundClient
    };
    let base_url = instance
        .origin
        .map(|id| cx.tree.node(id))
        .filter(|origin| origin.kind() == "call")
        .and_then(|origin| CallArgs::of(origin).keyword("base_url"))
        .map(url_expression);

    Some(Target {
        library: library.to_string(),
        method_name: name.to_string(),
        convention,
        client: Some(ClientBinding {
            variable: instance.variable.clone(),
            constructor: instance.constructor.clone(),
            span: cx.tree.node(instance.declared_at).span(),
        }),
        base_url,
        is_async: *is_async,
    })
}

fn build_fact(cx: &FileContext<'_>, call: Node<'_>, target: Target) -> HttpCallFact {
    let args = CallArgs::of(call);
    let mut degradations = BTreeSet::new();

    let (method, url_node) = if catalog::is_generic_request_method(&target.method_name) {
        let method = args
            .arg(0, "method")
            .and_then(string_literal)
            .and_then(|m| HttpMethod::from_name(&m));
        (method, args.arg(1, "url"))
    } else {
        (
            catalog::method_for_name(&target.method_name),
            args.arg(0, "url"),
        )
    };
    if method.is_none() {
        degradations.insert(Degradation::UnknownMethod);
    }

    let url = match url_node {
        Some(node) => url_expression(node),
        None => UrlExpression::Unknown {
            expr: String::new(),
        },
    };
    if url.is_unknown() {
        degradations.insert(Degradation::UnknownUrl);
    }

    let mut options = BTreeSet::new();
    let mut option_keys: BTreeMap<OptionKind, Vec<String>> = BTreeMap::new();
    for (keyword, value) in &args.keywords {
        let Some(kind) = catalog::option_kind(keyword) else {
            continue;
        };
        options.insert(kind);
        let keys = dict_keys(*value);
        if !keys.is_empty() {
            option_keys.entry(kind).or_default().extend(keys);
        }
    }

    let response = response_target(call);
    let response_usage = response
        .map(|variable| response_usage(cx, call, variable))
        .unwrap_or_default();

    HttpCallFact {
        file: cx.file.to_string(),
        span: call.span(),
        library: target.library,
        method,
        url,
        base_url: target.base_url,
        options,
        option_keys,
        convention: target.convention,
        client: target.client,
        is_async: target.is_async,
        response_variable: response.map(|v| v.text().to_string()),
        response_usage,
        degradations,
    }
}

/// Capture a URL argument as a literal, a template or an opaque expression.
pub fn url_expression(node: Node<'_>) -> UrlExpression {
    let node = unwrap_parens(node);
    if let Some(segments) = string_template(node) {
        return from_segments(segments);
    }
    if node.kind() == "binary_operator" && node.has_token("+") {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let current = unwrap_parens(current);
            if current.kind() == "binary_operator" && current.has_token("+") {
                if let (Some(left), Some(right)) =
                    (current.child_by_field("left"), current.child_by_field("right"))
                {
                    stack.push(right);
                    stack.push(left);
                    continue;
                }
            }
            leaves.push(current);
        }

        let mut segments = Vec::new();
        for leaf in leaves {
            match string_template(leaf) {
                Some(parts) => {
                    for part in parts {
                        match part {
                            UrlSegment::Literal { text } => push_literal(&mut segments, &text),
                            slot => segments.push(slot),
                        }
                    }
                }
                None => segments.push(UrlSegment::Slot {
                    expr: leaf.text().to_string(),
                }),
            }
        }
        return from_segments(segments);
    }
    UrlExpression::Unknown {
        expr: node.text().to_string(),
    }
}

fn from_segments(segments: Vec<UrlSegment>) -> UrlExpression {
    if segments
        .iter()
        .all(|s| matches!(s, UrlSegment::Literal { .. }))
    {
        let value = segments
            .into_iter()
            .map(|s| match s {
                UrlSegment::Literal { text } => text,
                UrlSegment::Slot { expr } => expr,
            })
            .collect();
        UrlExpression::Literal { value }
    } else {
        UrlExpression::Templated { segments }
    }
}

/// Variable that receives the response: `r = await c.get(...)` or
/// `async with s.get(...) as r`.
fn response_target(call: Node<'_>) -> Option<Node<'_>> {
    let mut node = call;
    loop {
        let parent = node.parent()?;
        match parent.kind() {
            "await" | "parenthesized_expression" => node = parent,
            "assignment" if node.field() == Some("right") => {
                let left = parent.child_by_field("left")?;
                return (left.kind() == "identifier").then_some(left);
            }
            "as_pattern" if node.field() != Some("alias") => {
                let alias = parent.child_by_field("alias")?;
                let target = alias
                    .named_children()
                    .find(|c| c.kind() == "identifier")
                    .or_else(|| (alias.kind() == "identifier").then_some(alias))?;
                return Some(target);
            }
            _ => return None,
        }
    }
}

/// Attribute names read from the response variable while it still holds
/// this call's result.
fn response_usage(cx: &FileContext<'_>, call: Node<'_>, variable: Node<'_>) -> Vec<String> {
    let name = variable.text();
    let scope = cx.tree.node(cx.table.scope_node(cx.table.scope_of(call)));
    let mut usage: Vec<String> = Vec::new();
    for node in scope.descendants() {
        if node.kind() != "attribute" || node.start_byte() < call.end_byte() {
            continue;
        }
        let Some(object) = node.child_by_field("object") else {
            continue;
        };
        if object.kind() != "identifier" || object.text() != name {
            continue;
        }
        let same_value = matches!(
            cx.table.lookup(name, object),
            Some(Binding::Value(v)) if v.origin == call.id()
        );
        if !same_value {
            continue;
        }
        if let Some(attr) = node.child_by_field("attribute") {
            let attr = attr.text().to_string();
            if !usage.contains(&attr) {
                usage.push(attr);
            }
        }
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::languages::python::test_support::with_context;

    fn calls(source: &str) -> Vec<HttpCallFact> {
        with_context(source, extract)
    }

    #[test]
    fn test_module_functions() {
        let facts = calls(
            "import requests\nfrom httpx import post as send\nrequests.get('https://api.example.com/users')\nsend('/items', json={'name': 'x'})\n",
        );
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].library, "requests");
        assert_eq!(facts[0].method, Some(HttpMethod::Get));
        assert_eq!(
            facts[0].url.as_literal(),
            Some("https://api.example.com/users")
        );
        assert_eq!(facts[0].convention, CallConvention::ModuleFunction);
        assert_eq!(facts[1].library, "httpx");
        assert_eq!(facts[1].method, Some(HttpMethod::Post));
        assert!(facts[1].options.contains(&OptionKind::Json));
        assert_eq!(facts[1].option_keys[&OptionKind::Json], vec!["name".to_string()]);
    }

    #[test]
    fn test_bound_client_with_templated_url() {
        let facts = calls(
            "import httpx\nclient = httpx.Client(base_url='https://api.example.com')\ndef load(user_id):\n    return client.get(f'/users/{user_id}')\n",
        );
        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.method, Some(HttpMethod::Get));
        assert_eq!(
            fact.url,
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
        assert_eq!(fact.convention, CallConvention::BoundClient);
        assert_eq!(
            fact.base_url,
            Some(UrlExpression::Literal {
                value: "https://api.example.com".into()
            })
        );
        let client = fact.client.as_ref().unwrap();
        assert_eq!(client.variable.as_deref(), Some("client"));
        assert_eq!(client.constructor, "httpx.Client");
        assert!(fact.degradations.is_empty());
    }

    #[test]
    fn test_scoped_and_inline_clients() {
        let facts = calls(
            "import aiohttp, httpx\nasync def main():\n    async with aiohttp.ClientSession() as session:\n        async with session.post('/submit', data=payload) as resp:\n            body = await resp.json()\n            code = resp.status\n    httpx.Client().delete('/x')\n",
        );
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].library, "aiohttp");
        assert_eq!(facts[0].convention, CallConvention::ScopedClient);
        assert!(facts[0].is_async);
        assert_eq!(facts[0].response_variable.as_deref(), Some("resp"));
        assert_eq!(facts[0].response_usage, vec!["json".to_string(), "status".to_string()]);
        assert_eq!(facts[1].convention, CallConvention::InlineClient);
        assert_eq!(facts[1].method, Some(HttpMethod::Delete));
    }

    #[test]
    fn test_generic_request_method() {
        let facts = calls(
            "import requests\ns = requests.Session()\ns.request('PATCH', '/a')\ns.request(verb, url=target)\n",
        );
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].method, Some(HttpMethod::Patch));
        assert_eq!(facts[0].url.as_literal(), Some("/a"));
        assert_eq!(facts[1].method, None);
        assert!(facts[1].degradations.contains(&Degradation::UnknownMethod));
        assert!(facts[1].degradations.contains(&Degradation::UnknownUrl));
    }

    #[test]
    fn test_concatenated_url() {
        let facts = calls("import requests\nrequests.get(BASE + '/users/' + str(uid))\n");
        assert_eq!(
            facts[0].url,
            UrlExpression::Templated {
                segments: vec![
                    UrlSegment::Slot {
                        expr: "BASE".into()
                    },
                    UrlSegment::Literal {
                        text: "/users/".into()
                    },
                    UrlSegment::Slot {
                        expr: "str(uid)".into()
                    },
                ]
            }
        );
    }

    #[test]
    fn test_response_usage_tracking() {
        let facts = calls(
            "import requests\ndef f():\n    r = requests.get('/a')\n    r.raise_for_status()\n    data = r.json()\n    r.json()\n    r = other()\n    r.text\n",
        );
        assert_eq!(facts[0].response_variable.as_deref(), Some("r"));
        assert_eq!(
            facts[0].response_usage,
            vec!["raise_for_status".to_string(), "json".to_string()]
        );
    }

    #[test]
    fn test_unrelated_get_is_ignored() {
        let facts = calls("config = {}\nconfig.get('key')\nimport os\nos.environ.get('X')\n");
        assert!(facts.is_empty());
    }
}
