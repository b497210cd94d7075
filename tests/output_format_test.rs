//! Tests for the JSON report format.
//!
//! These tests verify the top-level shape downstream tools rely on.

use std::path::PathBuf;

use apiscan::cli::collect_files;
use apiscan::report::{self, Summary};
use apiscan::AnalysisContext;
use globset::GlobSet;

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn run_and_get_json() -> serde_json::Value {
    apiscan::init();

    let root = testdata_path().join("service");
    let files = collect_files(&root, false, &GlobSet::empty()).expect("should collect files");
    let unit = AnalysisContext::new(&root).analyze_unit(&files, true);
    let json = report::render_json("service", None, &unit).expect("should render JSON");
    serde_json::from_str(&json).expect("should be valid JSON")
}

#[test]
fn test_json_top_level_fields() {
    let json = run_and_get_json();

    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["path"], "service");
    assert!(json.get("config").is_none(), "config omitted when not set");
    for key in [
        "http_calls",
        "routes",
        "groups",
        "unresolved_includes",
        "schemas",
        "tools",
        "files",
    ] {
        assert!(json[key].is_array(), "{} should be an array", key);
    }
}

#[test]
fn test_json_summary_counts() {
    let json = run_and_get_json();

    let summary = &json["summary"];
    let calls = json["http_calls"].as_array().unwrap().len();
    let routes = json["routes"].as_array().unwrap().len();
    let tools = json["tools"].as_array().unwrap().len();
    let schemas = json["schemas"].as_array().unwrap().len();
    assert_eq!(calls, 3);
    assert_eq!(routes, 5);
    assert_eq!(tools, 1);
    assert_eq!(schemas, 3);
    assert_eq!(summary["parse_errors"], 0);
    assert_eq!(summary["files"], json["files"].as_array().unwrap().len());
}

#[test]
fn test_json_route_fields() {
    let json = run_and_get_json();

    let routes = json["routes"].as_array().unwrap();
    let read_user = routes
        .iter()
        .find(|r| r["handler"] == "read_user")
        .expect("should find read_user");
    assert_eq!(read_user["framework"], "fastapi");
    assert_eq!(read_user["methods"][0], "GET");
    assert_eq!(read_user["effective_path"], "/internal/users/{user_id}");
    assert!(read_user.get("degradations").is_none());
}

#[test]
fn test_summary_line_matches_summary() {
    let summary = Summary {
        facts: 9,
        degraded: 0,
        files: 9,
        parse_errors: 0,
    };
    assert_eq!(report::summary_line(&summary), "9 facts (0 degraded) in 9 files");
}
