//! Output formatting for scan results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output grouped by fact category
//! - JSON: the full unit facts for programmatic consumption

use colored::*;
use serde::Serialize;

use crate::analysis::facts::{Degradations, GroupStatus, Span};
use crate::analysis::UnitFacts;

// =============================================================================
// JSON Format
// =============================================================================

/// Totals shown at the end of every report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub facts: usize,
    pub degraded: usize,
    pub files: usize,
    pub parse_errors: usize,
}

impl Summary {
    pub fn of(unit: &UnitFacts) -> Self {
        Self {
            facts: unit.fact_count(),
            degraded: unit.degraded_count(),
            files: unit.files.len(),
            parse_errors: unit.parse_error_count(),
        }
    }
}

#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<&'a str>,
    pub summary: Summary,
    #[serde(flatten)]
    pub facts: &'a UnitFacts,
}

/// Render the JSON report.
pub fn render_json(path: &str, config: Option<&str>, unit: &UnitFacts) -> anyhow::Result<String> {
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        path,
        config,
        summary: Summary::of(unit),
        facts: unit,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Write results in JSON format.
pub fn write_json(path: &str, config: Option<&str>, unit: &UnitFacts) -> anyhow::Result<()> {
    println!("{}", render_json(path, config, unit)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

pub fn write_pretty(path: &str, config: Option<&str>, unit: &UnitFacts) {
    // Header
    println!();
    print!("  ");
    print!("{}", "apiscan".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    print!("  {}", "Config:   ".dimmed());
    println!("{}", config.unwrap_or("(built-in catalog)"));
    println!();

    if !unit.http_calls.is_empty() {
        write_http_calls(unit);
        println!();
    }
    if !unit.routes.is_empty() {
        write_routes(unit);
        println!();
    }
    if !unit.groups.is_empty() {
        write_groups(unit);
        println!();
    }
    if !unit.schemas.is_empty() {
        write_schemas(unit);
        println!();
    }
    if !unit.tools.is_empty() {
        write_tools(unit);
        println!();
    }

    println!("  {}", summary_line(&Summary::of(unit)));
    println!();
}

/// One-line totals, e.g. `12 facts (2 degraded) in 4 files`.
pub fn summary_line(summary: &Summary) -> String {
    let mut line = format!(
        "{} facts ({} degraded) in {} files",
        summary.facts, summary.degraded, summary.files
    );
    if summary.parse_errors > 0 {
        line.push_str(&format!(", {} with parse errors", summary.parse_errors));
    }
    line
}

/// Left-aligned column, always followed by a separator.
fn column(text: &str, width: usize) -> String {
    format!("{:<width$} ", text, width = width)
}

fn write_location(file: &str, span: &Span) {
    print!("{}", file.blue());
    print!("{}", format!(":{}", span.start_line).dimmed());
}

fn write_degradations(degradations: &Degradations) {
    if degradations.is_empty() {
        return;
    }
    let names: Vec<&str> = degradations.iter().map(|d| d.as_str()).collect();
    print!("  {}", format!("[{}]", names.join(", ")).yellow());
}

fn write_http_calls(unit: &UnitFacts) {
    println!("  {} ({}):", "HTTP calls".bold(), unit.http_calls.len());
    println!();
    for call in &unit.http_calls {
        let method = call.method.map(|m| m.as_str()).unwrap_or("?");
        print!("    {}", column(method, 8).green());
        print!("{}", call.url);
        print!("  {}", call.library.dimmed());
        write_degradations(&call.degradations);
        println!();
        print!("            ");
        write_location(&call.file, &call.span);
        println!();
    }
}

fn write_routes(unit: &UnitFacts) {
    println!("  {} ({}):", "Routes".bold(), unit.routes.len());
    println!();
    for route in &unit.routes {
        let methods: Vec<&str> = route.methods.iter().map(|m| m.as_str()).collect();
        let methods = if methods.is_empty() {
            "?".to_string()
        } else {
            methods.join(",")
        };
        print!("    {}", column(&methods, 8).green());
        print!("{}", route.effective_path.as_deref().unwrap_or("<unknown>"));
        print!("  {}", format!("{} ({})", route.handler, route.framework).dimmed());
        write_degradations(&route.degradations);
        println!();
        print!("            ");
        write_location(&route.file, &route.span);
        println!();
    }
}

fn write_groups(unit: &UnitFacts) {
    println!("  {} ({}):", "Route groups".bold(), unit.groups.len());
    println!();
    for group in &unit.groups {
        let status = match group.status {
            GroupStatus::Root => column("root", 8).normal(),
            GroupStatus::Linked => column("linked", 8).normal(),
            GroupStatus::Cyclic => column("cyclic", 8).red(),
        };
        print!("    {}", status);
        print!("{}", group.effective_prefix.as_deref().unwrap_or("/"));
        print!(
            "  {}",
            format!("{} {} ({} routes)", group.kind.as_str(), group.key, group.members.len()).dimmed()
        );
        println!();
    }
    for include in &unit.unresolved_includes {
        print!("    {}", column("unresolved", 8).yellow());
        print!("{}", include.method);
        print!("  ");
        write_location(&include.file, &include.span);
        println!();
    }
}

fn write_schemas(unit: &UnitFacts) {
    println!("  {} ({}):", "Schemas".bold(), unit.schemas.len());
    println!();
    for schema in &unit.schemas {
        print!("    {}", column(schema.kind.as_str(), 12).green());
        print!("{}", schema.name);
        print!("  {}", format!("{} fields", schema.fields.len()).dimmed());
        write_degradations(&schema.degradations);
        println!();
        print!("            ");
        write_location(&schema.file, &schema.span);
        println!();
    }
}

fn write_tools(unit: &UnitFacts) {
    println!("  {} ({}):", "Tools".bold(), unit.tools.len());
    println!();
    for tool in &unit.tools {
        print!("    {}", column(tool.kind.as_str(), 10).green());
        print!("{}", tool.name);
        print!(
            "  {}",
            format!("{} params on {}", tool.parameters.len(), tool.server.variable).dimmed()
        );
        write_degradations(&tool.degradations);
        println!();
        print!("            ");
        write_location(&tool.file, &tool.span);
        println!();
    }
}
