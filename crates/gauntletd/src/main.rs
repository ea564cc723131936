use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gauntlet_core::config::{load_run_config, ConfigError};
use gauntletd::driver::DriverError;
use gauntletd::tracker::StatusTracker;
use gauntletd::{display, driver};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Run(PathBuf),
    Help(String),
    Version,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Args(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to install SIGINT handler: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("gauntlet startup failed: {err}");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG`-driven diagnostics on stderr; defaults to `warn` so the
/// progress display owns stdout.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn run() -> Result<i32, MainError> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "gauntlet".to_string());
    let command = parse_cli_args(argv.collect(), &program)?;

    match command {
        CliCommand::Help(text) => {
            println!("{text}");
            Ok(0)
        }
        CliCommand::Version => {
            println!("gauntlet {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        CliCommand::Run(config_path) => run_execution(&config_path),
    }
}

fn run_execution(config_path: &Path) -> Result<i32, MainError> {
    let config = load_run_config(config_path)?;
    let tracker = StatusTracker::new(&config.results_file);

    let interrupt = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupt))
        .map_err(|source| MainError::Signal { source })?;

    let state = driver::run_all(&config, &tracker, &interrupt)?;
    display::print_summary(&state);

    if interrupt.load(Ordering::Relaxed) {
        Ok(130)
    } else if state.failed > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn parse_cli_args(args: Vec<String>, program: &str) -> Result<CliCommand, MainError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliCommand::Help(help_text(program)));
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliCommand::Version);
    }

    let mut config_path: Option<PathBuf> = None;
    for arg in args {
        if arg.starts_with('-') {
            return Err(MainError::Args(format!(
                "unknown flag '{arg}'\n{}",
                usage_line(program)
            )));
        }
        if config_path.is_some() {
            return Err(MainError::Args(format!(
                "unexpected extra argument '{arg}'\n{}",
                usage_line(program)
            )));
        }
        config_path = Some(PathBuf::from(arg));
    }

    match config_path {
        Some(path) => Ok(CliCommand::Run(path)),
        None => Err(MainError::Args(format!(
            "missing config file\n{}",
            usage_line(program)
        ))),
    }
}

fn usage_line(program: &str) -> String {
    format!("usage: {program} <config.json>")
}

fn help_text(program: &str) -> String {
    format!(
        "{usage}\n\n\
Runs every (task x model) cell of the configured matrix against the agent,\n\
each in an isolated git worktree, and writes durable progress to the\n\
configured results file.\n\n\
Options:\n\
  -h, --help     print this help\n\
  -V, --version  print the version\n\n\
Exit codes: 0 all runs succeeded, 1 any run failed, 130 interrupted.",
        usage = usage_line(program)
    )
}
