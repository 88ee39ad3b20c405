//! # cxgraph CLI Entry Point
//!
//! This is the main executable for the `cxg` command-line tool.
//! It parses CLI arguments using clap and routes commands to the library.
//!
//! ## Commands
//!
//! - `scan`  - index the source directories and report problems
//! - `tree`  - show the build set and why each file is in it
//! - `plan`  - show which units are stale and the compile waves
//! - `build` - compile what is stale, then link
//! - `watch` - rebuild on every change
//! - `clean` - remove build outputs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use cxgraph::build::{self, CancelToken, FeedbackAnalyzer, Pipeline};
use cxgraph::config::{self, CxGraphConfig};
use cxgraph::diagnostics::{Diagnostic, Reporter, TracingReporter};
use cxgraph::index::{ScanOptions, SourceIndex};
use cxgraph::toolchain::GccToolchain;
use cxgraph::tree;

#[derive(Parser)]
#[command(name = "cxg")]
#[command(about = "Source dependency resolver and incremental builder for embedded C/C++", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory containing cxgraph.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log resolution decisions (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the source directories and report parse problems
    Scan,
    /// Show the build set as a tree of reasons
    Tree,
    /// Show stale units and compile waves without building
    Plan,
    /// Compile stale units and link
    Build {
        /// Maximum parallel compiler processes (overrides concurrency_limit)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Rebuild whenever a source file changes
    Watch {
        /// Maximum parallel compiler processes
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Remove the build directory and compile_commands.json
    Clean,
}

/// Prints diagnostics to the terminal.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, diagnostic: &Diagnostic) {
        let tag = if diagnostic.is_parse_error() {
            "!".yellow()
        } else {
            "i".cyan()
        };
        eprintln!("{} {}", tag, diagnostic);
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            "cxgraph=debug".into()
        } else {
            "cxgraph=warn".into()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = cli.root.as_path();
    match cli.command {
        Commands::Scan => scan(root),
        Commands::Tree => {
            let pipeline = load_pipeline(root, &ConsoleReporter)?;
            print!("{}", tree::render_tree(&pipeline.graph, &pipeline.build_set));
            Ok(())
        }
        Commands::Plan => show_plan(root),
        Commands::Build { jobs } => {
            let cancel = CancelToken::new();
            install_ctrlc(&cancel)?;
            if run_build(root, jobs, &cancel, &ConsoleReporter) {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Commands::Watch { jobs } => {
            let cancel = CancelToken::new();
            install_ctrlc(&cancel)?;
            let config = load_config(root)?;
            build::watch(root, &config, || {
                if cancel.is_cancelled() {
                    std::process::exit(130);
                }
                // Diagnostics repeat on every rebuild; keep them in the log.
                run_build(root, jobs, &cancel, &TracingReporter);
            })
        }
        Commands::Clean => {
            let config = load_config(root)?;
            build::clean(root, &config).map(|_| ())
        }
    }
}

fn install_ctrlc(cancel: &CancelToken) -> Result<()> {
    let token = cancel.clone();
    ctrlc::set_handler(move || token.cancel()).context("Failed to set Ctrl+C handler")
}

fn load_config(root: &Path) -> Result<CxGraphConfig> {
    config::load_config(root)
        .with_context(|| format!("Failed to load {}", root.join(config::CONFIG_FILE).display()))
}

fn load_pipeline(root: &Path, reporter: &dyn Reporter) -> Result<Pipeline> {
    let config = load_config(root)?;
    Ok(Pipeline::load(root, config, reporter)?)
}

fn scan(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let options = ScanOptions {
        skip_dirs: vec![config.build.build_dir.clone()],
        extra_files: config.forced_sources.iter().map(|r| r.path.clone()).collect(),
    };
    let (index, diagnostics) = SourceIndex::scan(root, &config.project.src_dirs, &options)?;
    ConsoleReporter.report_all(&diagnostics);

    let units = index.translation_units().count();
    println!(
        "{} Indexed {} files ({} translation units, {} headers)",
        "✓".green(),
        index.len(),
        units,
        index.len() - units
    );
    Ok(())
}

fn show_plan(root: &Path) -> Result<()> {
    let pipeline = load_pipeline(root, &ConsoleReporter)?;
    let cache = pipeline.load_cache();
    let mut plan = pipeline.plan(&cache);
    plan.mark_missing_objects();

    if plan.is_up_to_date() {
        println!("{} Up to date ({} units)", "⚡".green(), plan.entries.len());
        return Ok(());
    }
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("{} {}", "Wave".bold(), i + 1);
        for unit in wave {
            let reason = plan
                .entry(unit)
                .and_then(|e| e.stale.as_ref())
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!(
                "  {} {}",
                pipeline.graph.index().relative(unit).display(),
                format!("({})", reason).dimmed()
            );
        }
    }
    println!(
        "{} of {} units stale",
        plan.stale_count().to_string().bold(),
        plan.entries.len()
    );
    Ok(())
}

/// One full build. Failures are printed; returns whether the build succeeded.
fn run_build(
    root: &Path,
    jobs: Option<usize>,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> bool {
    let start = Instant::now();
    match try_build(root, jobs, cancel, reporter) {
        Ok(report) => {
            for (unit, warnings) in &report.warnings {
                println!("{} Warning in {}:\n{}", "!".yellow(), unit.display(), warnings);
            }
            if report.linked {
                println!(
                    "{} Build finished in {:.2?} ({} compiled)",
                    "✓".green(),
                    start.elapsed(),
                    report.compiled.len()
                );
            } else {
                println!("{} Up to date", "⚡".green());
            }
            true
        }
        Err(e) => {
            println!("{} {:#}", "x".red(), e);
            let detail = match e.downcast_ref::<cxgraph::Error>() {
                Some(cxgraph::Error::Compile { message, .. })
                | Some(cxgraph::Error::Link { message }) => Some(message.as_str()),
                _ => None,
            };
            if let Some(hint) = detail.and_then(FeedbackAnalyzer::analyze) {
                println!("\n{} {}", "Hint:".bold().cyan(), hint);
            }
            false
        }
    }
}

fn try_build(
    root: &Path,
    jobs: Option<usize>,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> Result<build::BuildReport> {
    let pipeline = load_pipeline(root, reporter)?;
    let toolchain = GccToolchain::from_config(&pipeline.config)?;
    let cache = pipeline.load_cache();
    let mut plan = pipeline.plan(&cache);

    build::write_compile_commands(
        pipeline.project_root(),
        &plan,
        &toolchain,
        pipeline.include_paths(),
    )?;

    let concurrency = jobs.unwrap_or_else(|| pipeline.config.concurrency());
    let report = build::execute(
        &mut plan,
        &toolchain,
        pipeline.include_paths(),
        &cache,
        concurrency,
        cancel,
    )?;
    Ok(report)
}
