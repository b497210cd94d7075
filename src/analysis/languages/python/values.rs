//! Literal and argument helpers shared by the Python extractors.

use crate::analysis::facts::{Constraints, UrlSegment};
use crate::analysis::types::LiteralValue;
use crate::parser::Node;

/// Longest default-value summary kept on a fact.
const MAX_SUMMARY_LEN: usize = 80;

/// Positional and keyword arguments of a call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs<'t> {
    pub positional: Vec<Node<'t>>,
    pub keywords: Vec<(&'t str, Node<'t>)>,
    /// `*args` or `**kwargs` present; positions after it are unreliable.
    pub has_splat: bool,
}

impl<'t> CallArgs<'t> {
    pub fn of(call: Node<'t>) -> Self {
        match call.child_by_field("arguments") {
            Some(list) => Self::of_arguments(list),
            None => CallArgs::default(),
        }
    }

    /// Arguments of an `argument_list` (also used for class bases).
    pub fn of_arguments(list: Node<'t>) -> Self {
        let mut args = CallArgs::default();
        if list.kind() != "argument_list" {
            // `f(x for x in y)`: a bare generator argument.
            args.positional.push(list);
            return args;
        }
        for child in list.named_children() {
            match child.kind() {
                "keyword_argument" => {
                    if let (Some(name), Some(value)) =
                        (child.child_by_field("name"), child.child_by_field("value"))
                    {
                        args.keywords.push((name.text(), value));
                    }
                }
                "list_splat" | "dictionary_splat" => args.has_splat = true,
                _ => args.positional.push(child),
            }
        }
        args
    }

    pub fn keyword(&self, name: &str) -> Option<Node<'t>> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    pub fn positional(&self, index: usize) -> Option<Node<'t>> {
        self.positional.get(index).copied()
    }

    /// Keyword first, then the positional slot.
    pub fn arg(&self, index: usize, keyword: &str) -> Option<Node<'t>> {
        self.keyword(keyword).or_else(|| self.positional(index))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty() && !self.has_splat
    }
}

/// Strip redundant parentheses.
pub fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match node.named_children().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Strip `await` and parentheses.
pub fn unwrap_await(node: Node<'_>) -> Node<'_> {
    let mut node = unwrap_parens(node);
    while node.kind() == "await" {
        match node.named_children().next() {
            Some(inner) => node = unwrap_parens(inner),
            None => break,
        }
    }
    node
}

/// Lowercased string prefix (`f`, `rb`, ...).
fn string_prefix(string: Node<'_>) -> String {
    string
        .children()
        .find(|c| c.kind() == "string_start")
        .map(|start| {
            start
                .text()
                .trim_end_matches(['"', '\''])
                .to_ascii_lowercase()
        })
        .unwrap_or_default()
}

fn unescape(raw: &str, is_raw: bool, is_fstring: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !is_raw => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some('\n') => {}
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '{' | '}' if is_fstring && chars.peek() == Some(&c) => {
                chars.next();
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Segments of a single `string` node, or `None` for byte strings.
fn string_segments(string: Node<'_>) -> Option<Vec<UrlSegment>> {
    let prefix = string_prefix(string);
    if prefix.contains('b') {
        return None;
    }
    let is_raw = prefix.contains('r');
    let is_fstring = prefix.contains('f');
    let mut segments = Vec::new();
    for child in string.children() {
        match child.kind() {
            "string_content" | "escape_sequence" => {
                let text = unescape(child.text(), is_raw, is_fstring);
                push_literal(&mut segments, &text);
            }
            "interpolation" => {
                let expr = child
                    .child_by_field("expression")
                    .or_else(|| child.named_children().next())
                    .map(|e| e.text().to_string())
                    .unwrap_or_default();
                segments.push(UrlSegment::Slot { expr });
            }
            _ => {}
        }
    }
    Some(segments)
}

pub fn push_literal(segments: &mut Vec<UrlSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(UrlSegment::Literal { text: last }) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(UrlSegment::Literal {
            text: text.to_string(),
        });
    }
}

/// Literal and interpolated pieces of a string or implicit concatenation.
pub fn string_template(node: Node<'_>) -> Option<Vec<UrlSegment>> {
    let node = unwrap_parens(node);
    match node.kind() {
        "string" => string_segments(node),
        "concatenated_string" => {
            let mut segments = Vec::new();
            for part in node.named_children() {
                for segment in string_segments(part)? {
                    match segment {
                        UrlSegment::Literal { text } => push_literal(&mut segments, &text),
                        slot => segments.push(slot),
                    }
                }
            }
            Some(segments)
        }
        _ => None,
    }
}

/// Value of a plain (non-interpolated) string literal.
pub fn string_literal(node: Node<'_>) -> Option<String> {
    let segments = string_template(node)?;
    let mut out = String::new();
    for segment in segments {
        match segment {
            UrlSegment::Literal { text } => out.push_str(&text),
            UrlSegment::Slot { .. } => return None,
        }
    }
    Some(out)
}

pub fn is_ellipsis(node: Node<'_>) -> bool {
    unwrap_parens(node).kind() == "ellipsis"
}

pub fn bool_value(node: Node<'_>) -> Option<bool> {
    match unwrap_parens(node).kind() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn numeric_text(node: Node<'_>) -> Option<String> {
    let node = unwrap_parens(node);
    match node.kind() {
        "integer" | "float" => Some(node.text().replace('_', "")),
        "unary_operator" => {
            let operand = node.child_by_field("argument")?;
            let inner = numeric_text(operand)?;
            if node.has_token("-") {
                Some(format!("-{}", inner))
            } else {
                Some(inner)
            }
        }
        _ => None,
    }
}

pub fn int_value(node: Node<'_>) -> Option<i64> {
    numeric_text(node)?.parse().ok()
}

pub fn number_value(node: Node<'_>) -> Option<serde_json::Number> {
    numeric_text(node)?.parse().ok()
}

/// A literal usable in `Literal[...]`, enum members or constraints.
pub fn literal_value(node: Node<'_>) -> Option<LiteralValue> {
    let node = unwrap_parens(node);
    match node.kind() {
        "string" | "concatenated_string" => string_literal(node).map(LiteralValue::Str),
        "true" => Some(LiteralValue::Bool(true)),
        "false" => Some(LiteralValue::Bool(false)),
        "none" => Some(LiteralValue::Null),
        "integer" | "unary_operator" => Some(
            int_value(node)
                .map(LiteralValue::Int)
                .unwrap_or_else(|| LiteralValue::Other(node.text().to_string())),
        ),
        "float" | "attribute" | "identifier" => Some(LiteralValue::Other(node.text().to_string())),
        _ => None,
    }
}

/// Strings of a list, tuple or set literal (or a single string).
pub fn string_list(node: Node<'_>) -> Option<Vec<String>> {
    let node = unwrap_parens(node);
    match node.kind() {
        "list" | "tuple" | "set" => node.named_children().map(string_literal).collect(),
        "string" | "concatenated_string" => string_literal(node).map(|s| vec![s]),
        _ => None,
    }
}

/// Literal keys of a dict display or a `dict(k=...)` call.
pub fn dict_keys(node: Node<'_>) -> Vec<String> {
    let node = unwrap_parens(node);
    match node.kind() {
        "dictionary" => node
            .named_children()
            .filter(|c| c.kind() == "pair")
            .filter_map(|pair| pair.child_by_field("key"))
            .filter_map(|key| string_literal(key).or_else(|| int_value(key).map(|i| i.to_string())))
            .collect(),
        "call" => {
            let is_dict = node
                .child_by_field("function")
                .map(|f| f.text() == "dict")
                .unwrap_or(false);
            if !is_dict {
                return Vec::new();
            }
            CallArgs::of(node)
                .keywords
                .iter()
                .map(|(k, _)| k.to_string())
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Key/value pairs of a dict display with literal keys.
pub fn dict_entries(node: Node<'_>) -> Vec<(String, Node<'_>)> {
    let node = unwrap_parens(node);
    if node.kind() != "dictionary" {
        return Vec::new();
    }
    node.named_children()
        .filter(|c| c.kind() == "pair")
        .filter_map(|pair| {
            let key = pair.child_by_field("key")?;
            let value = pair.child_by_field("value")?;
            let key = string_literal(key).or_else(|| int_value(key).map(|i| i.to_string()))?;
            Some((key, value))
        })
        .collect()
}

fn truncate(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_SUMMARY_LEN {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(MAX_SUMMARY_LEN - 3).collect();
    out.push_str("...");
    out
}

/// Short description of a default value expression.
pub fn default_summary(node: Node<'_>) -> String {
    let node = unwrap_parens(node);
    match node.kind() {
        "list" | "dictionary" | "tuple" | "set" if node.named_children().next().is_none() => {
            "empty".to_string()
        }
        "call" => {
            let callee = node.child_by_field("function").map(|f| f.text()).unwrap_or("");
            let empty_args = CallArgs::of(node).is_empty();
            if empty_args && matches!(callee, "list" | "dict" | "set" | "tuple" | "frozenset") {
                "empty".to_string()
            } else {
                "<expr>".to_string()
            }
        }
        "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none"
        | "identifier" | "attribute" | "unary_operator" | "list" | "tuple" | "dictionary"
        | "set" => truncate(node.text()),
        _ => "<expr>".to_string(),
    }
}

/// Validation constraints from keyword arguments (`ge=1`, `max_length=50`).
pub fn constraints_from(args: &CallArgs<'_>) -> Constraints {
    let mut constraints = Constraints::default();
    for (name, value) in &args.keywords {
        match *name {
            "gt" => constraints.gt = number_value(*value),
            "ge" => constraints.ge = number_value(*value),
            "lt" => constraints.lt = number_value(*value),
            "le" => constraints.le = number_value(*value),
            "multiple_of" => constraints.multiple_of = number_value(*value),
            "min_length" | "min_items" => {
                constraints.min_length = int_value(*value).and_then(|v| u64::try_from(v).ok())
            }
            "max_length" | "max_items" => {
                constraints.max_length = int_value(*value).and_then(|v| u64::try_from(v).ok())
            }
            "pattern" | "regex" => constraints.pattern = string_literal(*value),
            _ => {}
        }
    }
    constraints
}
