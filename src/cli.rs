//! Command-line interface for apiscan.

use clap::{Parser, Subcommand, ValueEnum};
use globset::GlobSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analysis::{registered_extensions, AnalysisContext, PythonAnalyzer};
use crate::config::{self, Config};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Starter config written by `apiscan init`.
const CONFIG_TEMPLATE: &str = include_str!("templates/apiscan.yaml");

/// Static extraction of HTTP calls, routes, schemas and tool signatures.
///
/// apiscan reads Python sources without running them and reports which
/// HTTP endpoints the code calls, which routes it serves, which data
/// shapes it declares and which MCP tools it exposes.
#[derive(Parser)]
#[command(name = "apiscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract facts from a file or directory
    Scan(ScanArgs),
    /// Write a starter apiscan.yaml
    Init(InitArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Path to scan (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,

    /// Analyze files on the calling thread only
    #[arg(long)]
    pub sequential: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "apiscan.yaml")]
    pub output: PathBuf,
}

/// Directories never worth scanning.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "site-packages",
    "venv",
    "env",
    "build",
    "dist",
];

/// Test directories, skipped unless test files are included.
const TEST_DIRS: &[&str] = &["tests", "test", "testing"];

fn is_test_file(name: &str) -> bool {
    name == "conftest.py"
        || (name.starts_with("test_") && name.ends_with(".py"))
        || name.ends_with("_test.py")
}

/// Collect Python files under `root`.
pub fn collect_files(
    root: &Path,
    include_test_files: bool,
    excluded: &GlobSet,
) -> anyhow::Result<Vec<PathBuf>> {
    let supported_extensions = registered_extensions();

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() || e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy().to_string();
            // Skip hidden directories
            if name.starts_with('.') {
                return false;
            }
            if SKIPPED_DIRS.contains(&name.as_str()) {
                return false;
            }
            include_test_files || !TEST_DIRS.contains(&name.as_str())
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !supported_extensions.iter().any(|s| s == ext) {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !include_test_files && is_test_file(name) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excluded.is_match(relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    // Resolve path
    let abs_path = match args.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };
    let root = if abs_path.is_dir() {
        abs_path.clone()
    } else {
        abs_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| abs_path.clone())
    };

    // Explicit config, else auto-discover next to the scan root
    let config_path = args.config.clone().or_else(|| Config::discover(&root));
    let config = match &config_path {
        Some(path) => match Config::parse_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
        None => Config::default(),
    };
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid config: {}", e);
        return Ok(EXIT_ERROR);
    }
    let catalog = config.catalog()?;
    let excluded = config.exclusions()?;

    let files = if abs_path.is_dir() {
        collect_files(&abs_path, config.should_include_test_files(), &excluded)?
    } else {
        vec![abs_path.clone()]
    };
    if files.is_empty() {
        warn!(path = %abs_path.display(), "no files to scan");
    }
    info!(files = files.len(), sequential = args.sequential, "scanning");

    let ctx = AnalysisContext::new(&root).with_analyzer(PythonAnalyzer::with_catalog(catalog));
    let unit = ctx.analyze_unit(&files, !args.sequential);

    let path_str = args.path.to_string_lossy().to_string();
    let config_str = config_path.map(|p| p.to_string_lossy().to_string());
    match args.format {
        Format::Json => report::write_json(&path_str, config_str.as_deref(), &unit)?,
        Format::Pretty => report::write_pretty(&path_str, config_str.as_deref(), &unit),
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Add your own clients, routers and model bases to the catalog section");
    println!("  2. Run: apiscan scan . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_template_is_valid_config() {
        let config: Config = serde_yaml::from_str(CONFIG_TEMPLATE).unwrap();
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_collect_files_skips_tests_and_exclusions() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for dir in ["app", "app/migrations", "tests", ".venv", "__pycache__"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in [
            "app/main.py",
            "app/test_main.py",
            "app/migrations/0001.py",
            "app/notes.md",
            "tests/test_api.py",
            ".venv/lib.py",
            "__pycache__/main.py",
        ] {
            fs::write(root.join(file), "").unwrap();
        }

        let config = Config {
            excluded_paths: vec!["**/migrations/**".to_string()],
            ..Config::default()
        };
        let excluded = config.exclusions().unwrap();

        let files = collect_files(root, false, &excluded).unwrap();
        assert_eq!(files, vec![root.join("app/main.py")]);

        let files = collect_files(root, true, &excluded).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("conf/apiscan.yaml");
        let args = InitArgs {
            output: output.clone(),
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(output.exists());
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
    }
}
