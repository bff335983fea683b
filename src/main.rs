use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use rebind::classifier::{Classification, classify};
use rebind::config::Config;
use rebind::convergence::RepairLoop;
use rebind::detector::ChangeDetector;
use rebind::dump;
use rebind::error::Error;
use rebind::guard::SourceGuard;
use rebind::strategy::KnownBindings;
use rebind::toolchain::{BuildOutcome, Compiler as _, Toolchain};

#[derive(Parser)]
#[command(name = "rebind", about = "Self-healing ReScript bindings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile once, classify the result, and print it.
    Check,
    /// Print identifier references to MODULE found in FILE's parse tree.
    Refs {
        /// Source file to dump-parse.
        file: PathBuf,
        /// Module name to collect references for.
        module: String,
    },
    /// Watch the tree and repair diagnostics until nothing is left to do.
    Run,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check => cmd_check(),
        Commands::Refs { file, module } => cmd_refs(&file, &module),
        Commands::Run => cmd_run(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Compile once and report the classification.
/// Exit code: 0 clean, 1 a diagnostic was found, 2 indeterminate output.
///
/// # Errors
///
/// Returns errors from config loading or the toolchain invocation.
fn cmd_check() -> Result<ExitCode, Error> {
    let root = PathBuf::from(".");
    let config = Config::load(&root)?;
    let mut compiler = Toolchain::new(&root, Duration::from_secs(config.compiler_timeout_secs));

    let outcome = compiler.build()?;
    let raw = match &outcome {
        BuildOutcome::Clean => None,
        BuildOutcome::Failed(text) => Some(text.as_str()),
    };

    match classify(raw, &root) {
        Classification::Clean => {
            println!("clean");
            Ok(ExitCode::SUCCESS)
        },
        Classification::Found(diagnostic) => {
            println!("{diagnostic}");
            Ok(ExitCode::from(1))
        },
        Classification::Indeterminate => {
            println!("indeterminate: no location anchor in compiler output");
            Ok(ExitCode::from(2))
        },
    }
}

/// Dump-parse one file and print references to a module, one per line.
///
/// # Errors
///
/// Returns errors from config loading, the toolchain, or dump parsing.
fn cmd_refs(file: &Path, module: &str) -> Result<ExitCode, Error> {
    let root = PathBuf::from(".");
    let config = Config::load(&root)?;
    let mut compiler = Toolchain::new(&root, Duration::from_secs(config.compiler_timeout_secs));

    let Some(raw) = compiler.dump_parse_tree(file)? else {
        eprintln!("{} compiles standalone; no parse tree dumped", file.display());
        return Ok(ExitCode::SUCCESS);
    };

    let tree = dump::parse(&raw)?;
    for reference in dump::find_references(&tree, module) {
        println!("{}", reference.display_name());
    }
    Ok(ExitCode::SUCCESS)
}

/// Wire the object graph leaves-first and run the convergence loop.
///
/// # Errors
///
/// Returns errors from config loading or the loop itself.
fn cmd_run() -> Result<ExitCode, Error> {
    let root = PathBuf::from(".");
    let config = Config::load(&root)?;

    let guard = SourceGuard::new(&config.src_dir);
    let detector = ChangeDetector::new(&config.src_dir, &config.source_pattern)?;
    let compiler = Toolchain::new(&root, Duration::from_secs(config.compiler_timeout_secs));
    let strategy = KnownBindings::new(&config.known_bindings_dir);

    let mut repair_loop = RepairLoop::new(
        &root,
        &config.bindings_path(),
        compiler,
        detector,
        guard,
        strategy,
    );
    repair_loop.run(
        Duration::from_millis(config.poll_interval_ms),
        config.max_rounds,
    )?;

    Ok(ExitCode::SUCCESS)
}
