// src/main.rs
//! CLI front-end: translates arguments into core inputs and renders
//! results. All analysis lives in the library; this binary only wires the
//! external collaborators (compile DB, scanner, build.ninja, changed-file
//! lists) into the pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use buildscope::advisor;
use buildscope::cache::Cache;
use buildscope::compiledb;
use buildscope::config::Config;
use buildscope::diff;
use buildscope::export;
use buildscope::impact;
use buildscope::libgraph;
use buildscope::paths::FilterSpec;
use buildscope::pipeline::{AnalyzeInputs, Analyzer};
use buildscope::reporting;
use buildscope::scanner;
use buildscope::snapshot::Snapshot;

#[derive(Parser)]
#[command(name = "buildscope")]
#[command(about = "Dependency structure analysis for Ninja C/C++ builds")]
#[command(version)]
struct Cli {
    /// Enable verbose logging (or set RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Include glob patterns (whitelist; may repeat)
    #[arg(long = "filter", global = true)]
    include: Vec<String>,

    /// Exclude glob patterns (may repeat)
    #[arg(long = "exclude", global = true)]
    exclude: Vec<String>,

    /// Skip the scan cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze the header DSM and print a summary
    Analyze {
        build_dir: PathBuf,
        /// Save the snapshot as a baseline file
        #[arg(long)]
        save: Option<PathBuf>,
        /// Print the full snapshot as JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
    /// Compute the rebuild impact of changed files
    Impact {
        build_dir: PathBuf,
        /// Changed file paths (canonical, project-relative)
        #[arg(long = "changed", required = true)]
        changed: Vec<PathBuf>,
    },
    /// Diff the current state against a saved baseline
    Diff {
        build_dir: PathBuf,
        #[arg(long)]
        baseline: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Rank refactoring candidates with ROI and break-even estimates
    Advise {
        build_dir: PathBuf,
        /// Show only the top N candidates
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Rank headers by transitive dependency weight and blast radius
    Hotspots {
        build_dir: PathBuf,
        /// Minimum transitive dependency count to report
        #[arg(long, default_value_t = 50)]
        threshold: usize,
    },
    /// Analyze library-level dependencies from build.ninja
    Libs { build_dir: PathBuf },
    /// Export the DSM in a machine-readable format
    Export {
        build_dir: PathBuf,
        #[arg(long, value_enum)]
        format: ExportFormat,
        #[arg(long)]
        output: PathBuf,
        /// Cluster cycle SCCs in DOT output
        #[arg(long)]
        cluster: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Graphml,
    Gexf,
    Dot,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::new();
    config.verbose = cli.verbose;
    config.filter = FilterSpec::new(cli.include.clone(), cli.exclude.clone());
    config.validate().context("invalid configuration")?;

    match &cli.command {
        Command::Analyze { build_dir, save, json } => {
            let snapshot = run_analysis(build_dir, &config, !cli.no_cache)?;
            if *json {
                println!("{}", export::to_json(&snapshot)?);
            } else {
                print!("{}", reporting::render_summary(&snapshot));
            }
            if let Some(path) = save {
                snapshot.save(path)?;
                println!("{}", format!("Baseline saved to {}", path.display()).green());
            }
        }
        Command::Impact { build_dir, changed } => {
            let snapshot = run_analysis(build_dir, &config, !cli.no_cache)?;
            let result = impact::compute(&snapshot, changed);
            println!(
                "Rebuild impact: {} of {} TUs ({:.1}%) direct, {} ({:.1}%) via closure",
                result.direct_tus.len(),
                result.tu_universe,
                result.direct_percentage,
                result.closure_tus.len(),
                result.closure_percentage,
            );
            for tu in &result.direct_tus {
                println!("  {}", tu.display());
            }
        }
        Command::Diff { build_dir, baseline, json } => {
            let current = run_analysis(build_dir, &config, !cli.no_cache)?;
            let baseline = Snapshot::load(baseline, &current.project_root)?;
            let delta = diff::diff(&baseline, &current, &config)?;
            if *json {
                reporting::print_json(&delta)?;
            } else {
                print!("{}", reporting::render_delta(&delta));
            }
        }
        Command::Advise { build_dir, top, json } => {
            let snapshot = run_analysis(build_dir, &config, !cli.no_cache)?;
            let mut candidates = advisor::identify(&snapshot, &config);
            candidates.truncate(*top);
            if *json {
                reporting::print_json(&candidates)?;
            } else if candidates.is_empty() {
                println!("{}", "No anti-patterns detected.".green());
            } else {
                print!("{}", reporting::render_action_plan(&candidates));
            }
        }
        Command::Hotspots { build_dir, threshold } => {
            let snapshot = run_analysis(build_dir, &config, !cli.no_cache)?;
            let hotspots = buildscope::hotspots::find_hotspots(&snapshot, *threshold);
            if hotspots.is_empty() {
                println!(
                    "{}",
                    format!("No headers with >= {threshold} transitive dependencies.").green()
                );
            }
            for spot in &hotspots {
                println!(
                    "{}: {} transitive deps, used by {} TUs, rebuilds {} headers, chain depth {}",
                    spot.path.display(),
                    spot.transitive_deps,
                    spot.usage_count,
                    spot.reverse_impact,
                    spot.max_chain_length,
                );
            }
            let boundary = buildscope::hotspots::cross_library(&snapshot);
            if boundary.cross_library_deps > 0 {
                println!(
                    "Cross-library includes: {} of {} ({:.1}%)",
                    boundary.cross_library_deps,
                    boundary.total_deps,
                    100.0 * boundary.cross_library_deps as f64 / boundary.total_deps as f64,
                );
            }
        }
        Command::Libs { build_dir } => {
            let ninja = read_build_ninja(build_dir)?;
            let graph = libgraph::parse_build_ninja(&ninja, &config);
            let metrics = graph.metrics()?;
            println!(
                "Libraries: {}   Executables: {}",
                graph.libraries.len(),
                graph.executables.len()
            );
            for (lib, m) in &metrics {
                println!(
                    "  {lib}: fan-in={} fan-out={} depth={} dependents={}",
                    m.fan_in, m.fan_out, m.depth, m.transitive_dependents
                );
            }
            let cycles = graph.cycles();
            if !cycles.is_empty() {
                println!("{}", format!("{} library cycles:", cycles.len()).red().bold());
                for cycle in cycles {
                    println!("  {}", cycle.join(" <-> "));
                }
            }
            let unused = graph.unused_libraries();
            if !unused.is_empty() {
                println!("Unused libraries: {}", unused.into_iter().collect::<Vec<_>>().join(", "));
            }
        }
        Command::Export { build_dir, format, output, cluster } => {
            let snapshot = run_analysis(build_dir, &config, !cli.no_cache)?;
            let body = match format {
                ExportFormat::Csv => export::to_csv(&snapshot),
                ExportFormat::Graphml => export::to_graphml(&snapshot),
                ExportFormat::Gexf => export::to_gexf(&snapshot),
                ExportFormat::Dot => export::to_dot(&snapshot, *cluster),
                ExportFormat::Json => export::to_json(&snapshot)?,
            };
            fs::write(output, body)
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!("{}", format!("Exported to {}", output.display()).green());
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Wires the external collaborators into the pipeline for one build dir.
fn run_analysis(build_dir: &Path, config: &Config, use_cache: bool) -> Result<Snapshot> {
    let db_path = build_dir.join("compile_commands.json");
    let compile_db = compiledb::load(&db_path)?;
    if compile_db.is_empty() {
        eprintln!("{}", "compile database is empty".yellow());
    }

    let build_ninja = read_build_ninja(build_dir).unwrap_or_default();

    let Some(scanner_bin) = scanner::find_scanner() else {
        bail!("clang-scan-deps not found on PATH; install clang to scan includes");
    };
    let scanner_output = scanner::run(
        &scanner_bin,
        build_dir,
        &db_path,
        config.scanner_timeout_secs,
    )?;

    let inputs = AnalyzeInputs {
        build_dir,
        compile_db: &compile_db,
        scanner_output: &scanner_output,
        build_ninja: &build_ninja,
        direct_includes: None,
        project_root: None,
    };
    let analyzer = Analyzer::new(config.clone())?;

    let snapshot = if use_cache {
        match Cache::open(build_dir) {
            Ok(cache) => analyzer.analyze(&inputs, Some(&cache), None, None)?,
            Err(e) => {
                eprintln!("{}", format!("cache unavailable ({e}); recomputing").yellow());
                analyzer.analyze(&inputs, None, None, None)?
            }
        }
    } else {
        analyzer.analyze(&inputs, None, None, None)?
    };
    Ok(snapshot)
}

fn read_build_ninja(build_dir: &Path) -> Result<String> {
    let path = build_dir.join("build.ninja");
    fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))
}
