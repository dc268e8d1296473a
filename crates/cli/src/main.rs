mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use fleet_workflow::{ClientConfig, SaveConfig};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Fleet maintenance task tool.
#[derive(Parser)]
#[command(name = "fleet", version, about = "Fleet maintenance task tool")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Organization the command acts on
    #[arg(long, global = true)]
    org: Option<String>,

    /// Path to a TOML file with save settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a maintenance form (JSON) against the submission rules
    Validate {
        /// Path to the form JSON file
        form: PathBuf,
        /// Highest odometer reading already recorded for the vehicle
        #[arg(long)]
        last_odometer: Option<i64>,
    },

    /// Validate and save a maintenance form
    Save {
        /// Path to the form JSON file
        form: PathBuf,
        /// Update this existing task instead of creating a new one
        #[arg(long)]
        task_id: Option<String>,
        /// Highest odometer reading already recorded for the vehicle
        #[arg(long)]
        last_odometer: Option<i64>,
        /// Save into in-memory storage instead of the hosted backend
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete a maintenance task and its line items
    Delete {
        /// Id of the task to delete
        task_id: String,
    },

    /// Load task catalog entries and vendors from a JSON file
    Seed {
        /// Path to the catalog JSON file
        catalog: PathBuf,
        /// Seed in-memory storage instead of the hosted backend
        #[arg(long)]
        dry_run: bool,
    },
}

/// Settings shared by every subcommand.
pub(crate) struct Context {
    pub output: OutputFormat,
    pub quiet: bool,
    pub org: Option<String>,
    pub save_config: SaveConfig,
}

impl Context {
    /// The `--org` value, or exit with an error.
    pub fn require_org(&self) -> String {
        match &self.org {
            Some(org) if !org.trim().is_empty() => org.clone(),
            _ => {
                report_error("error: --org is required", self.output, self.quiet);
                process::exit(1);
            }
        }
    }

    /// Backend connection settings from the environment, or exit with an error.
    pub fn require_client(&self) -> ClientConfig {
        match ClientConfig::from_env() {
            Ok(c) => c,
            Err(e) => {
                report_error(&format!("error: {}", e), self.output, self.quiet);
                process::exit(1);
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let save_config = match &cli.config {
        Some(path) => match SaveConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                report_error(&format!("error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        },
        None => SaveConfig::default(),
    };
    let ctx = Context {
        output: cli.output,
        quiet: cli.quiet,
        org: cli.org,
        save_config,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("error: failed to start async runtime: {}", e),
                ctx.output,
                ctx.quiet,
            );
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Validate {
            form,
            last_odometer,
        } => {
            commands::validate::cmd_validate(&ctx, &form, last_odometer);
        }
        Commands::Save {
            form,
            task_id,
            last_odometer,
            dry_run,
        } => {
            runtime.block_on(commands::save::cmd_save(
                &ctx,
                &form,
                task_id,
                last_odometer,
                dry_run,
            ));
        }
        Commands::Delete { task_id } => {
            runtime.block_on(commands::delete::cmd_delete(&ctx, &task_id));
        }
        Commands::Seed { catalog, dry_run } => {
            runtime.block_on(commands::seed::cmd_seed(&ctx, &catalog, dry_run));
        }
    }
}

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
