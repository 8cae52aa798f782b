//! Command execution.

use crate::config::{Config, ConfigError};
use crate::{CheckFormat, Commands, DumpFormat};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use smc_codegen::{GenerationError, Generator};
use smc_core::{
    check_with, dump, parse_file, CoreError, Diagnostic, ModelSummary, Severity, SimulationError,
    Simulator, StateMachine,
};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Success.
pub const EXIT_OK: i32 = 0;
/// The checker reported errors (or warnings with `warnings_as_errors`).
pub const EXIT_DIAGNOSTICS: i32 = 1;
/// A file could not be parsed.
pub const EXIT_SYNTAX: i32 = 2;
/// I/O, configuration, generation or simulation failure.
pub const EXIT_FAILURE: i32 = 3;

/// Errors that abort a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot generate code for '{}': {source}", path.display())]
    Generation {
        path: PathBuf,
        #[source]
        source: GenerationError,
    },

    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) => core_exit_code(e),
            _ => EXIT_FAILURE,
        }
    }
}

fn core_exit_code(e: &CoreError) -> i32 {
    if e.as_syntax().is_some() {
        EXIT_SYNTAX
    } else {
        EXIT_FAILURE
    }
}

/// Output of a command. Diagnostics, summaries and errors go to stderr;
/// artifacts (dumped source, generated code, JSON) go to stdout.
#[derive(Debug)]
pub struct Report {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: EXIT_OK,
        }
    }
}

impl Report {
    fn escalate(&mut self, code: i32) {
        self.exit_code = self.exit_code.max(code);
    }
}

/// Executes a command and returns its output.
pub fn execute(cmd: Commands, config: &Config) -> Result<Report, CliError> {
    match cmd {
        Commands::Check {
            files,
            dump,
            format,
            no_summary,
        } => Ok(check_files(&files, dump, format, !no_summary, config)),

        Commands::Dump { file, format } => {
            let machine = parse_file(&file)?;
            let stdout = match format {
                DumpFormat::Sm => dump(&machine),
                DumpFormat::Json => format_json(&serde_json::to_value(&machine)?) + "\n",
            };
            Ok(Report {
                stdout,
                ..Report::default()
            })
        }

        Commands::Generate { file, output } => {
            let machine = parse_file(&file)?;
            let code = Generator::new(config.codegen.clone())
                .generate(&machine)
                .map_err(|source| CliError::Generation {
                    path: file.clone(),
                    source,
                })?;

            let mut report = Report::default();
            match output {
                Some(path) => {
                    std::fs::write(&path, &code).map_err(|source| CliError::Write {
                        path: path.clone(),
                        source,
                    })?;
                    tracing::info!(output = %path.display(), "wrote generated code");
                    let _ = writeln!(
                        report.stderr,
                        "{} {} -> {}",
                        "Generated".green(),
                        machine.name.cyan(),
                        path.display()
                    );
                }
                None => report.stdout = code,
            }
            Ok(report)
        }

        Commands::Visit { file } => {
            let machine = parse_file(&file)?;
            Ok(Report {
                stdout: ModelSummary::of(&machine).render(),
                ..Report::default()
            })
        }

        Commands::Simulate { file, events, ctx } => {
            let machine = parse_file(&file)?;
            let ctx = match ctx {
                Some(text) => parse_json_arg(&text)?,
                None => Value::Object(Default::default()),
            };
            simulate(&machine, &events, ctx)
        }
    }
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    machine: &'a str,
    checksum: String,
    diagnostics: &'a [Diagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

fn check_files(
    files: &[PathBuf],
    with_dump: bool,
    format: CheckFormat,
    summary: bool,
    config: &Config,
) -> Report {
    let mut report = Report::default();
    let options = config.check.options();
    let (mut errors, mut warnings) = (0usize, 0usize);

    let parsed: Vec<(&PathBuf, Result<StateMachine, CoreError>)> =
        files.iter().map(|path| (path, parse_file(path))).collect();
    let mut json_reports = Vec::new();

    for (path, result) in &parsed {
        let machine = match result {
            Ok(machine) => machine,
            Err(e) => {
                let _ = writeln!(report.stderr, "{}: {}", "error".red().bold(), e);
                report.escalate(core_exit_code(e));
                continue;
            }
        };

        let diagnostics = check_with(machine, &options);
        errors += diagnostics.iter().filter(|d| d.is_error()).count();
        warnings += diagnostics.iter().filter(|d| !d.is_error()).count();

        match format {
            CheckFormat::Text => {
                if summary {
                    report.stderr.push_str(&ModelSummary::of(machine).render());
                }
                for d in &diagnostics {
                    let _ = writeln!(report.stderr, "{}", render_diagnostic(path, d));
                }
                if with_dump {
                    report.stdout.push_str(&dump(machine));
                }
            }
            CheckFormat::Json => json_reports.push((path, machine, diagnostics)),
        }
    }

    if format == CheckFormat::Json {
        let docs: Vec<FileReport> = json_reports
            .iter()
            .map(|(path, machine, diagnostics)| FileReport {
                file: path.display().to_string(),
                machine: &machine.name,
                checksum: machine.checksum(),
                diagnostics,
                source: with_dump.then(|| dump(machine)),
            })
            .collect();
        match serde_json::to_value(&docs) {
            Ok(value) => {
                report.stdout = format_json(&value) + "\n";
            }
            Err(e) => {
                let _ = writeln!(report.stderr, "{}: {}", "error".red().bold(), e);
                report.escalate(EXIT_FAILURE);
            }
        }
    }

    if summary {
        let _ = writeln!(
            report.stderr,
            "{}: {} file(s), {} error(s), {} warning(s)",
            "summary".bold(),
            files.len(),
            errors,
            warnings
        );
    }

    if errors > 0 || (warnings > 0 && config.check.warnings_as_errors) {
        report.escalate(EXIT_DIAGNOSTICS);
    }
    tracing::info!(files = files.len(), errors, warnings, "check finished");
    report
}

fn render_diagnostic(path: &Path, d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => format!("error[{}]", d.code).red().bold(),
        Severity::Warning => format!("warning[{}]", d.code).yellow().bold(),
    };
    format!("{}:{}: {}: {}", path.display(), d.location, severity, d.message)
}

fn simulate(machine: &StateMachine, events: &[String], ctx: Value) -> Result<Report, CliError> {
    let mut report = Report::default();
    let mut sim = Simulator::new(machine, ctx)?;
    let _ = writeln!(report.stdout, "{} {}", "start".dimmed(), sim.state().yellow());

    for event in events {
        match sim.apply(event) {
            Ok(step) => {
                let _ = write!(
                    report.stdout,
                    "{} {} -> {}",
                    step.event.cyan(),
                    step.from,
                    step.to.yellow()
                );
                if !step.actions.is_empty() {
                    let _ = write!(report.stdout, " [{}]", step.actions.join(", "));
                }
                report.stdout.push('\n');
            }
            Err(e) => {
                let _ = writeln!(
                    report.stderr,
                    "{}: {} ({})",
                    "error".red().bold(),
                    e,
                    e.error_code()
                );
                report.escalate(EXIT_FAILURE);
                break;
            }
        }
    }

    let _ = writeln!(report.stdout, "{} {}", "final".dimmed(), sim.state().yellow());
    Ok(report)
}

/// Parses JSON from an argument, or from a file with `@path`.
fn parse_json_arg(arg: &str) -> Result<Value, CliError> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| CliError::InvalidArgument(format!("cannot read '{}': {}", path, e)))?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
