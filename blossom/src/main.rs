#![forbid(unsafe_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use blossom_ast::Unit;
use blossom_core::{CheckReport, Checker, DiagnosticCache, DiagnosticKind};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, IntoDiagnostic};
use thiserror::Error;

mod cache_store;
mod config;
mod logging;
mod report;

#[derive(Parser, Debug)]
#[command(
    name = "blossom",
    version,
    about = "Match exhaustiveness and ownership checker for Blossom units"
)]
struct Cli {
    /// Config file to use instead of the nearest `blossom.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads for per-function checks (0 = all cores). Overrides `blossom.toml`.
    #[arg(long, global = true)]
    jobs: Option<usize>,

    /// Default log filter, e.g. "debug" or "blossom_core=trace". `BLOSSOM_LOG` wins over both.
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    /// Raise log verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check every function in a unit and report diagnostics
    Check {
        /// Unit file (JSON)
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Ignore and do not update the diagnostic cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },

    /// Print the lowered control-flow graph of each function
    Cfg {
        path: PathBuf,

        /// Only this function.
        #[arg(long)]
        function: Option<String>,
    },

    /// Print the compiled decision tables of exhaustive matches
    Decisions {
        path: PathBuf,

        #[arg(long)]
        function: Option<String>,
    },

    /// Describe a diagnostic kind (e.g. `UseAfterMove` or `use_after_move`)
    Explain {
        kind: Option<String>,
    },
}

#[derive(Debug, Error, Diagnostic)]
#[error("{count} error(s) in unit `{unit}`")]
#[diagnostic(code(blossom::check_failed), help("run `blossom explain <kind>` for details on a diagnostic"))]
struct CheckFailed {
    unit: String,
    count: usize,
}

#[derive(Debug, Error, Diagnostic)]
#[error("unknown diagnostic kind `{0}`")]
#[diagnostic(code(blossom::unknown_kind), help("run `blossom explain` to list the kinds"))]
struct UnknownKind(String);

#[derive(Debug, Error, Diagnostic)]
#[error("no function named `{0}` in the unit")]
#[diagnostic(code(blossom::unknown_function))]
struct UnknownFunction(String);

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let start = match &cli.cmd {
        Cmd::Check { path, .. } | Cmd::Cfg { path, .. } | Cmd::Decisions { path, .. } => {
            path.clone()
        }
        Cmd::Explain { .. } => std::env::current_dir().into_diagnostic()?,
    };
    let mut resolved = config::load_config(cli.config.as_deref(), &start)?;
    if let Some(jobs) = cli.jobs {
        resolved.config.check.jobs = jobs;
    }

    let level = cli.log_level.clone().or_else(|| resolved.config.log.level.clone());
    let log_file = resolved.log_file();
    let _guard = logging::init_logging(level.as_deref(), log_file.as_deref(), cli.verbose);
    if let Some(path) = &resolved.path {
        tracing::debug!(config = %path.display(), "loaded config");
    }

    match cli.cmd {
        Cmd::Check {
            path,
            format,
            no_cache,
        } => check(&path, format, no_cache, &resolved),
        Cmd::Cfg { path, function } => cfg(&path, function.as_deref(), &resolved),
        Cmd::Decisions { path, function } => decisions(&path, function.as_deref(), &resolved),
        Cmd::Explain { kind } => explain(kind.as_deref()),
    }
}

fn read_unit(path: &Path) -> miette::Result<Unit> {
    let raw = fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?;
    serde_json::from_str(&raw)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("{} is not a valid unit", path.display())))
}

fn check(
    path: &Path,
    format: Format,
    no_cache: bool,
    resolved: &config::ResolvedConfig,
) -> miette::Result<()> {
    let mut unit = read_unit(path)?;
    let checker = Checker::with_config(resolved.config.check.clone());

    let use_cache = resolved.config.cache.enabled && !no_cache;
    let report = if use_cache {
        cache_store::fill_cache_keys(&mut unit, checker.config())?;
        let cache_file = resolved.cache_file();
        let mut cache = cache_store::load(&cache_file);
        let report = checker.check_unit_cached(&unit, &mut cache);
        prune(&unit, &mut cache);
        cache_store::save(&cache_file, &cache)?;
        report
    } else {
        checker.check_unit(&unit)
    };

    match format {
        Format::Text => print!("{}", report::render_text(&report)),
        Format::Json => {
            let json = serde_json::to_string_pretty(&report::json_report(&report)).into_diagnostic()?;
            println!("{json}");
        }
    }

    finish(&report)
}

/// Drop cache entries for functions no longer in the unit.
fn prune(unit: &Unit, cache: &mut DiagnosticCache) {
    let before = cache.len();
    cache.retain_keys(unit.functions().filter_map(|f| f.cache_key.as_deref()));
    if cache.len() != before {
        tracing::debug!(removed = before - cache.len(), "pruned stale cache entries");
    }
}

fn finish(report: &CheckReport) -> miette::Result<()> {
    if report.has_errors() {
        return Err(CheckFailed {
            unit: report.unit.clone(),
            count: report.diagnostics.len(),
        }
        .into());
    }
    Ok(())
}

fn cfg(path: &Path, function: Option<&str>, resolved: &config::ResolvedConfig) -> miette::Result<()> {
    let unit = read_unit(path)?;
    require_function(&unit, function)?;
    let checker = Checker::with_config(resolved.config.check.clone());
    let (bodies, diagnostics) = checker.lower_unit(&unit);
    for body in bodies
        .iter()
        .filter(|b| function.is_none_or(|f| b.name == f))
    {
        println!("{}", blossom_ir::body_to_string(body));
    }
    for d in &diagnostics {
        eprintln!("{}: {}", d.kind.code(), d.message);
    }
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(CheckFailed {
            unit: unit.name.clone(),
            count: diagnostics.len(),
        }
        .into())
    }
}

fn decisions(
    path: &Path,
    function: Option<&str>,
    resolved: &config::ResolvedConfig,
) -> miette::Result<()> {
    let unit = read_unit(path)?;
    require_function(&unit, function)?;
    let checker = Checker::with_config(resolved.config.check.clone());
    let report = checker.check_unit(&unit);
    for (name, tables) in &report.decision_tables {
        if function.is_some_and(|f| f != name) {
            continue;
        }
        for table in tables {
            println!("fn {name} @ {}", table.span);
            println!("{}", table.render());
        }
    }
    if report.has_errors() {
        eprint!("{}", report::render_text(&report));
    }
    finish(&report)
}

fn require_function(unit: &Unit, function: Option<&str>) -> miette::Result<()> {
    match function {
        Some(name) if !unit.functions().any(|f| f.name.node == name) => {
            Err(UnknownFunction(name.to_string()).into())
        }
        _ => Ok(()),
    }
}

fn explain(kind: Option<&str>) -> miette::Result<()> {
    let Some(raw) = kind else {
        for kind in DiagnosticKind::ALL {
            println!("{:<22} {}", kind.name(), kind.code());
        }
        return Ok(());
    };
    let kind = DiagnosticKind::parse(raw).ok_or_else(|| UnknownKind(raw.to_string()))?;
    println!("{} ({})\n", kind.name(), kind.code());
    println!("{}", kind.explain());
    Ok(())
}
