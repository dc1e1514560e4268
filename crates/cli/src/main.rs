mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use commands::synth::{cmd_synth, SynthArgs};
use commands::validate::cmd_validate;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Synthesize deployment templates from an application description.
#[derive(Parser)]
#[command(
    name = "armature",
    version,
    about = "Synthesize deployment templates from a construct tree"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log pipeline progress to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize an application description into a cloud assembly
    Synth {
        /// Path to the application description (JSON)
        app: PathBuf,
        /// TOML settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output directory (overrides out-dir)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Treat validation warnings as errors
        #[arg(long)]
        strict: bool,
        /// Allow splitting units into linked documents
        #[arg(long)]
        linked: bool,
        /// Split units even when they fit in one document (implies --linked)
        #[arg(long)]
        prefer_linked: bool,
        /// Skip the validation phase
        #[arg(long)]
        skip_validation: bool,
        /// Write compact JSON
        #[arg(long)]
        compact: bool,
        /// Per-document size ceiling in bytes
        #[arg(long)]
        max_template_size: Option<usize>,
    },

    /// Validate a single deployment document
    Validate {
        /// Path to the deployment document (JSON)
        template: PathBuf,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Synth {
            app,
            config,
            out,
            strict,
            linked,
            prefer_linked,
            skip_validation,
            compact,
            max_template_size,
        } => {
            cmd_synth(
                &SynthArgs {
                    app: &app,
                    config: config.as_deref(),
                    out: out.as_deref(),
                    strict,
                    linked,
                    prefer_linked,
                    skip_validation,
                    compact,
                    max_template_size,
                },
                cli.output,
                cli.quiet,
            );
        }
        Commands::Validate { template, strict } => {
            cmd_validate(&template, strict, cli.output, cli.quiet);
        }
    }
}

/// Report an error message to stderr in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
