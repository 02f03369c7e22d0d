//! # Takeoff CLI
//!
//! Command-line front end for `takeoff_core`.
//!
//! Commands:
//! - `eval`        - evaluate a formula against `name=value` parameters
//! - `convert`     - convert a value between units
//! - `functions`   - print the function reference
//! - `init`        - create a new `.tko` project file
//! - `calculate`   - calculate one element/assembly quantity in a project
//! - `recalculate` - recalculate every assembly for an element
//! - `audit`       - print a project's audit trail

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use takeoff_core::config::{EngineConfig, LogFormat};

mod commands;

#[derive(Parser)]
#[command(name = "takeoff", about = "Takeoff: quantity calculation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "TAKEOFF_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula and print its trace
    Eval {
        formula: String,

        /// Parameter as name=value (repeatable)
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Print the evaluation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a value between units
    Convert { value: f64, from: String, to: String },

    /// Print the function and unit reference
    Functions,

    /// Create a new project file
    Init {
        path: PathBuf,

        #[arg(long, default_value = "")]
        estimator: String,

        #[arg(long, default_value = "")]
        job: String,

        #[arg(long, default_value = "")]
        client: String,

        /// Add a sample catalog and element
        #[arg(long)]
        sample: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Calculate one quantity and store it in the project
    Calculate {
        project: PathBuf,

        /// Element name or id
        #[arg(short, long)]
        element: String,

        /// Assembly code or id
        #[arg(short, long)]
        assembly: String,

        /// system, user:<id> or ai:<model>
        #[arg(long)]
        actor: Option<String>,
    },

    /// Recalculate every assembly matching an element's classification
    Recalculate {
        project: PathBuf,

        /// Element name or id
        #[arg(short, long)]
        element: String,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Print the audit trail
    Audit {
        project: PathBuf,

        /// Only records for this element (name or id)
        #[arg(short, long)]
        element: Option<String>,

        /// Only failed attempts
        #[arg(long)]
        failures: bool,

        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => commands::exit_with(&anyhow::Error::from(e)),
    };

    init_tracing(cli.verbose, config.log_format);
    tracing::debug!(engine_version = %config.engine_version, "configuration loaded");

    let result = match cli.command {
        Commands::Eval { formula, params, json } => commands::eval(&config, &formula, &params, json),
        Commands::Convert { value, from, to } => commands::convert(value, &from, &to),
        Commands::Functions => commands::functions(),
        Commands::Init {
            path,
            estimator,
            job,
            client,
            sample,
            force,
        } => commands::init(&path, &estimator, &job, &client, sample, force),
        Commands::Calculate {
            project,
            element,
            assembly,
            actor,
        } => commands::calculate(&config, &project, &element, &assembly, actor.as_deref()),
        Commands::Recalculate { project, element, actor } => {
            commands::recalculate(&config, &project, &element, actor.as_deref())
        }
        Commands::Audit {
            project,
            element,
            failures,
            json,
        } => commands::audit(&project, element.as_deref(), failures, json),
    };

    if let Err(e) = result {
        commands::exit_with(&e);
    }
}

/// Logs go to stderr so command output stays machine-readable.
fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
