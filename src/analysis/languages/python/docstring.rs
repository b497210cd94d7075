//! Best-effort docstring parsing (Google, NumPy and Sphinx styles).

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::parser::Node;

use super::values::string_literal;

lazy_static! {
    /// Google-style section header: `Args:`, `Returns:`...
    static ref GOOGLE_HEADER: Regex = Regex::new(
        r"^(Args|Arguments|Parameters|Params|Keyword Args|Keyword Arguments|Returns|Return|Yields|Raises|Examples?|Notes?|Attributes|See Also|Warnings?)\s*:\s*$"
    ).unwrap();

    /// NumPy-style underline below a section title.
    static ref NUMPY_RULE: Regex = Regex::new(r"^-{3,}\s*$").unwrap();

    /// Google parameter line: `name (type): description`.
    static ref GOOGLE_PARAM: Regex = Regex::new(
        r"^\*{0,2}([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(([^)]*)\))?\s*:\s*(.*)$"
    ).unwrap();

    /// NumPy parameter line: `name : type`.
    static ref NUMPY_PARAM: Regex = Regex::new(
        r"^\*{0,2}([A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*(.*))?$"
    ).unwrap();

    static ref SPHINX_PARAM: Regex = Regex::new(
        r"^:param\s+(?:[^:]*\s)?([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(.*)$"
    ).unwrap();

    static ref SPHINX_RETURNS: Regex = Regex::new(r"^:returns?\s*:\s*(.*)$").unwrap();

    /// Any other Sphinx field (`:type x:`, `:rtype:`, `:raises ...:`).
    static ref SPHINX_FIELD: Regex = Regex::new(r"^:[A-Za-z]+[^:]*:").unwrap();
}

/// Structured view of a docstring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Docstring {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub params: BTreeMap<String, String>,
    pub returns: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Params,
    Returns,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Google,
    NumPy,
}

fn section_for(title: &str) -> Section {
    match title {
        "Args" | "Arguments" | "Parameters" | "Params" | "Keyword Args" | "Keyword Arguments" => {
            Section::Params
        }
        "Returns" | "Return" | "Yields" => Section::Returns,
        _ => Section::Other,
    }
}

/// Docstring of a function or class body: its leading string statement.
pub fn docstring_of(body: Node<'_>) -> Option<String> {
    let first = body.named_children().next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_children().next()?;
    if expr.kind() != "string" && expr.kind() != "concatenated_string" {
        return None;
    }
    string_literal(expr).map(|raw| clean(&raw))
}

/// Dedent like `inspect.cleandoc`: the first line is stripped, the rest lose
/// their common indentation, and blank edges are dropped.
pub fn clean(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push(line.trim().to_string());
        } else if line.trim().is_empty() {
            out.push(String::new());
        } else {
            out.push(line.get(indent..).unwrap_or(line.trim_start()).trim_end().to_string());
        }
    }
    while out.first().map(|l| l.is_empty()).unwrap_or(false) {
        out.remove(0);
    }
    while out.last().map(|l| l.is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn append(target: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

/// Parse a cleaned docstring.
pub fn parse(text: &str) -> Docstring {
    let lines: Vec<&str> = text.lines().collect();
    let mut doc = Docstring::default();

    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return doc;
    };
    doc.summary = Some(lines[first].trim().to_string());

    let mut description: Vec<&str> = Vec::new();
    let mut section: Option<(Section, Style, usize)> = None;
    let mut current_param: Option<(String, usize)> = None;
    let mut returns = String::new();

    let mut i = first + 1;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        let indent = indent_of(line);

        // Section headers
        if let Some(caps) = GOOGLE_HEADER.captures(trimmed) {
            section = Some((section_for(&caps[1]), Style::Google, indent));
            current_param = None;
            i += 1;
            continue;
        }
        if !trimmed.is_empty()
            && lines
                .get(i + 1)
                .map(|next| NUMPY_RULE.is_match(next.trim()))
                .unwrap_or(false)
        {
            section = Some((section_for(trimmed), Style::NumPy, indent));
            current_param = None;
            i += 2;
            continue;
        }

        // Sphinx fields can appear anywhere after the description.
        if let Some(caps) = SPHINX_PARAM.captures(trimmed) {
            let name = caps[1].to_string();
            doc.params.insert(name.clone(), caps[2].trim().to_string());
            section = Some((Section::Other, Style::Google, indent));
            current_param = Some((name, indent));
            i += 1;
            continue;
        }
        if let Some(caps) = SPHINX_RETURNS.captures(trimmed) {
            append(&mut returns, &caps[1]);
            section = Some((Section::Returns, Style::Google, indent));
            current_param = None;
            i += 1;
            continue;
        }
        if SPHINX_FIELD.is_match(trimmed) {
            section = Some((Section::Other, Style::Google, indent));
            current_param = None;
            i += 1;
            continue;
        }

        match section {
            None => description.push(line),
            Some((_, _, _)) if trimmed.is_empty() => {}
            Some((Section::Params, style, base)) => {
                let continuation = current_param
                    .as_ref()
                    .map(|(_, param_indent)| indent > *param_indent)
                    .unwrap_or(false);
                if continuation {
                    if let Some((name, _)) = &current_param {
                        if let Some(existing) = doc.params.get_mut(name) {
                            append(existing, trimmed);
                        }
                    }
                } else {
                    let parsed = match style {
                        Style::Google => GOOGLE_PARAM
                            .captures(trimmed)
                            .map(|c| (c[1].to_string(), c[3].trim().to_string())),
                        Style::NumPy if indent <= base => NUMPY_PARAM
                            .captures(trimmed)
                            .map(|c| (c[1].to_string(), String::new())),
                        Style::NumPy => None,
                    };
                    if let Some((name, text)) = parsed {
                        doc.params.insert(name.clone(), text);
                        current_param = Some((name, indent));
                    }
                }
            }
            Some((Section::Returns, _, _)) => append(&mut returns, trimmed),
            Some((Section::Other, _, _)) => {
                if let Some((name, param_indent)) = &current_param {
                    if indent > *param_indent {
                        if let Some(existing) = doc.params.get_mut(name) {
                            append(existing, trimmed);
                        }
                    }
                }
            }
        }
        i += 1;
    }

    let description = description.join("\n").trim().to_string();
    if !description.is_empty() {
        doc.description = Some(description);
    }
    if !returns.is_empty() {
        doc.returns = Some(returns);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_dedents() {
        let raw = "Summary line.\n\n    Longer text\n      indented more\n    ";
        assert_eq!(clean(raw), "Summary line.\n\nLonger text\n  indented more");
    }

    #[test]
    fn test_google_style() {
        let doc = parse(
            "Search the catalog.\n\nRuns a full-text query.\n\nArgs:\n    query: Text to look for.\n    limit (int): Maximum number of\n        results to return.\n\nReturns:\n    Matching items.\n",
        );
        assert_eq!(doc.summary.as_deref(), Some("Search the catalog."));
        assert_eq!(doc.description.as_deref(), Some("Runs a full-text query."));
        assert_eq!(doc.params["query"], "Text to look for.");
        assert_eq!(doc.params["limit"], "Maximum number of results to return.");
        assert_eq!(doc.returns.as_deref(), Some("Matching items."));
    }

    #[test]
    fn test_numpy_style() {
        let doc = parse(
            "Add numbers.\n\nParameters\n----------\na : int\n    First operand.\nb : int\n    Second operand.\n\nReturns\n-------\nint\n    The sum.\n",
        );
        assert_eq!(doc.summary.as_deref(), Some("Add numbers."));
        assert_eq!(doc.description, None);
        assert_eq!(doc.params["a"], "First operand.");
        assert_eq!(doc.params["b"], "Second operand.");
        assert_eq!(doc.returns.as_deref(), Some("int The sum."));
    }

    #[test]
    fn test_sphinx_style() {
        let doc = parse(
            "Fetch a user.\n\n:param user_id: Identifier of the user.\n:type user_id: int\n:returns: The user record.\n",
        );
        assert_eq!(doc.params["user_id"], "Identifier of the user.");
        assert_eq!(doc.returns.as_deref(), Some("The user record."));
    }

    #[test]
    fn test_summary_only() {
        let doc = parse("Ping.");
        assert_eq!(doc.summary.as_deref(), Some("Ping."));
        assert!(doc.params.is_empty());
        assert_eq!(parse("   \n  "), Docstring::default());
    }
}
