//! smc - State Machine Compiler
//!
//! Parses `.sm` files, checks them, prints canonical source and generates
//! Python class skeletons.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use config::Config;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smc")]
#[command(about = "Compiler for textual state machine specifications")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "SMC_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CheckFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    Sm,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and check one or more files
    Check {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the canonical source of each file to stdout
        #[arg(long)]
        dump: bool,

        /// Diagnostic output format
        #[arg(long, value_enum, default_value = "text")]
        format: CheckFormat,

        /// Do not print the model summary and totals
        #[arg(long)]
        no_summary: bool,
    },

    /// Print a file in canonical form
    Dump {
        /// Input file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "sm")]
        format: DumpFormat,
    },

    /// Generate Python class skeletons
    Generate {
        /// Input file
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a summary of states, actions and transitions
    Visit {
        /// Input file
        file: PathBuf,
    },

    /// Run events through the machine
    Simulate {
        /// Input file
        file: PathBuf,

        /// Events to apply, in order
        #[arg(short, long, value_delimiter = ',', required = true)]
        events: Vec<String>,

        /// Initial context JSON (or @file.json to read from file)
        #[arg(long)]
        ctx: Option<String>,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(commands::EXIT_FAILURE);
        }
    };

    match commands::execute(cli.command, &config) {
        Ok(report) => {
            print!("{}", report.stdout);
            eprint!("{}", report.stderr);
            let _ = std::io::stdout().flush();
            std::process::exit(report.exit_code);
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(e.exit_code());
        }
    }
}
