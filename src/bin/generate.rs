//! Code Generation CLI
//!
//! Loads a serialized resolution table, runs the selected target plugins and
//! writes their files under the repository root.
//!
//! Usage:
//!   polyglot-gen --table table.json --out /path/to/repo
//!   polyglot-gen --table table.json --target ts/types --dry-run
//!   polyglot-gen --table table.json --check

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use polyglot_schemas::codegen::freshness::{check_fresh, collect_sources, is_unchanged, sources_of};
use polyglot_schemas::codegen::{GeneratedFile, PluginOutput};
use polyglot_schemas::{CompilerConfig, Registry, Request, Table};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyglot-gen")]
#[command(about = "Generate C++, TypeScript and Protobuf types from a resolution table")]
struct Cli {
    /// Serialized resolution table produced by the analyzer
    #[arg(short, long)]
    table: PathBuf,

    /// Repository root to write into (default: config repo_root)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Explicit config file, layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Plugin to run (repeatable; default: all)
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Only verify that generated files are up to date
    #[arg(long)]
    check: bool,

    /// Schema directory whose files count as sources for --check
    #[arg(long)]
    schemas: Option<PathBuf>,

    /// Schema file extension used with --schemas
    #[arg(long, default_value = "schema")]
    schema_ext: String,

    /// Print what would be written without touching the disk
    #[arg(long)]
    dry_run: bool,

    /// Skip formatter and compiler hooks after writing
    #[arg(long)]
    no_post_write: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CompilerConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    let root = cli.out.clone().unwrap_or_else(|| config.repo_root());

    let json = fs::read_to_string(&cli.table).with_context(|| format!("failed to read {:?}", cli.table))?;
    let table = Table::from_json(&json).with_context(|| format!("failed to parse {:?}", cli.table))?;

    let targets = if cli.targets.is_empty() {
        config.generate.targets.clone()
    } else {
        cli.targets.clone()
    };

    let registry = Registry::with_defaults(&config);
    let request = Request::new(&table).with_repo_root(&root);
    let report = registry.generate_all(&request, &targets).context("generation failed")?;

    for error in report.errors() {
        eprintln!("⚠️  {}", error);
    }

    if cli.check {
        let mut sources = sources_of(table.declared());
        if let Some(dir) = &cli.schemas {
            sources.extend(collect_sources(dir, &cli.schema_ext)?);
        }
        let files: Vec<GeneratedFile> = report.files().cloned().collect();
        check_fresh(&root, &files, &sources).context("generated files are out of date")?;
        println!("✅ {} generated files are up to date", files.len());
        return finish(report.error_count());
    }

    if cli.dry_run {
        for file in report.files() {
            println!("{}", root.join(&file.path).display());
        }
        return finish(report.error_count());
    }

    let post_write = config.generate.post_write && !cli.no_post_write;
    for output in &report.outputs {
        let written = write_output(&root, output)?;
        if !post_write || written.is_empty() {
            continue;
        }
        let Some(plugin) = registry.get(&output.plugin) else {
            continue;
        };
        if let Err(e) = plugin.post_write(&written, &request) {
            warn!(plugin = %output.plugin, error = %e, "post-write hook failed");
            eprintln!("⚠️  {}: {}", output.plugin, e);
        }
    }

    finish(report.error_count())
}

/// Write a plugin's files, skipping ones whose content is unchanged
fn write_output(root: &Path, output: &PluginOutput) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for file in &output.response.files {
        let path = root.join(&file.path);
        if is_unchanged(root, file) {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
        }
        fs::write(&path, &file.content).with_context(|| format!("failed to write {:?}", path))?;
        info!(plugin = %output.plugin, path = %file.path, "wrote file");
        written.push(path);
    }
    println!("📦 {}: {} written, {} unchanged", output.plugin, written.len(), output.response.files.len() - written.len());
    Ok(written)
}

fn finish(error_count: usize) -> anyhow::Result<()> {
    if error_count > 0 {
        bail!("{} error(s) during generation", error_count);
    }
    Ok(())
}
