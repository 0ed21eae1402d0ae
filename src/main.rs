//! Loadflow CLI Entry Point
//!
//! Provides command-line interface for running staged load workflows.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow
//! loadflow nightly_load.yaml
//!
//! # Dry run mode (print dispatches, nothing executes)
//! loadflow nightly_load.yaml --dry-run
//!
//! # Use a settings file and a fixed execution id
//! loadflow nightly_load.yaml --config loadflow.yaml --execution-id run-2024-06-01
//!
//! # Cap parallel stages at 8 jobs in flight
//! loadflow nightly_load.yaml --parallel 8
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use colored::Colorize;
use log::{error, info, warn};

use loadflow::audit::{AuditStore, InMemoryAuditStore, JsonFileAuditStore};
use loadflow::execution::{
    CallbackChannel, CallbackReceiver, DryRunExecutor, Orchestrator, RemoteExecutor, RunReport,
    ShellExecutor,
};
use loadflow::trigger::{Launcher, TriggerRequest};
use loadflow::{load_workflow, Settings, APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Command-line configuration parsed from arguments.
///
/// Unset options fall back to the settings file and environment.
#[derive(Debug, Default)]
struct Config {
    workflow_path: String,
    config_path: Option<String>,
    execution_id: Option<String>,
    concurrency_cap: Option<usize>,
    timeout_secs: Option<u64>,
    scripts_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    audit_dir: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
}

impl Config {
    /// Layers the command-line overrides on top of loaded settings.
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(cap) = self.concurrency_cap {
            settings.concurrency_cap = cap;
        }
        if let Some(secs) = self.timeout_secs {
            settings.callback_timeout_secs = secs;
        }
        if let Some(ref dir) = self.scripts_dir {
            settings.scripts_dir = dir.clone();
        }
        if let Some(ref dir) = self.log_dir {
            settings.log_dir = dir.clone();
        }
        if let Some(ref dir) = self.audit_dir {
            settings.audit_dir = dir.clone();
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Staged Data-Load Orchestrator");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: loadflow [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>       Path to workflow YAML or JSON file");
    println!();
    println!("Options:");
    println!("  --config PATH         Settings file (YAML)");
    println!("  --execution-id ID     Unique id for this run (default: <workflow>-<timestamp>)");
    println!("  --parallel N          Maximum jobs in flight per parallel stage (default: 40)");
    println!("  --timeout SECS        Callback timeout per job (default: 86400)");
    println!("  --scripts-dir PATH    Directory holding the scripts");
    println!("  --log-dir PATH        Directory receiving per-job result logs");
    println!("  --audit-dir PATH      Directory of the audit records");
    println!("  --dry-run             Print dispatches without running scripts");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Settings can also be given as LOADFLOW_* environment variables.");
    println!();
    println!("Examples:");
    println!("  loadflow nightly_load.yaml");
    println!("  loadflow nightly_load.yaml --dry-run");
    println!("  loadflow nightly_load.yaml --config loadflow.yaml --parallel 8");
}

/// Returns the value following an option.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config {
        workflow_path: DEFAULT_WORKFLOW.to_string(),
        ..Config::default()
    };
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                config.config_path = Some(option_value(args, &mut i, arg)?.to_string());
            }
            "--execution-id" => {
                config.execution_id = Some(option_value(args, &mut i, arg)?.to_string());
            }
            "--parallel" => {
                let value = option_value(args, &mut i, arg)?;
                config.concurrency_cap = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid parallel value: {}", value))?,
                );
            }
            "--timeout" => {
                let value = option_value(args, &mut i, arg)?;
                config.timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid timeout value: {}", value))?,
                );
            }
            "--scripts-dir" => {
                config.scripts_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--log-dir" => {
                config.log_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--audit-dir" => {
                config.audit_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Prints the per-stage outcome and the timeline of a finished run.
fn print_summary(report: &RunReport) {
    println!();
    for stage in &report.stages {
        let marker = if stage.success {
            "ok".green()
        } else {
            "FAILED".red()
        };
        println!(
            "Stage {} ({}, {} jobs): {}",
            stage.index,
            stage.mode,
            stage.jobs.len(),
            marker
        );
        for job in stage.jobs.iter().filter(|job| !job.is_success()) {
            println!(
                "  {} {}",
                job.job_name.red(),
                job.error_message.as_deref().unwrap_or("").dimmed()
            );
        }
    }

    println!("{}", report.timeline.gantt_chart());

    let status = if report.is_success() {
        "SUCCEEDED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "Run {}: {} after {:.2?}",
        report.execution.workflow_execution_id,
        status,
        report.timeline.elapsed()
    );
    if let Some(ref failure) = report.failure {
        println!("Reason: {}", failure);
    }
}

/// Main application entry point. Returns whether the run succeeded.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let mut settings = Settings::load(config.config_path.as_deref())?;
    config.apply_to(&mut settings);
    settings.validate()?;

    if config.dry_run {
        info!("Mode: DRY RUN (scripts will not execute)");
        println!();
    }

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow '{}' loaded: {} enabled stages, {} jobs",
        workflow.workflow_id,
        workflow.stages.len(),
        workflow.job_names().len()
    );

    let execution_id = config.execution_id.clone().unwrap_or_else(|| {
        format!(
            "{}-{}",
            workflow.workflow_id,
            Utc::now().format("%Y%m%d%H%M%S")
        )
    });

    let channel = Arc::new(CallbackChannel::new());
    let receiver = CallbackReceiver::new(Arc::clone(&channel));

    let executor: Arc<dyn RemoteExecutor> = if config.dry_run {
        Arc::new(DryRunExecutor::new(receiver))
    } else {
        info!("Scripts directory: {}", settings.scripts_dir.display());
        Arc::new(ShellExecutor::new(&settings.scripts_dir, receiver))
    };

    // Dry runs leave no audit trail behind.
    let audit: Arc<dyn AuditStore> = if config.dry_run {
        Arc::new(InMemoryAuditStore::new())
    } else {
        info!("Audit directory: {}", settings.audit_dir.display());
        Arc::new(JsonFileAuditStore::new(&settings.audit_dir))
    };

    let orchestrator = Orchestrator::new(executor, channel, audit, settings);
    let launcher = Launcher::new(Arc::new(orchestrator));

    let handle = launcher
        .start(TriggerRequest::new(workflow, execution_id))
        .await?;

    // Ctrl-C stops orchestrating; scripts already started keep running.
    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            canceller.cancel();
        }
    });

    let report = handle.wait().await?;
    print_summary(&report);

    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
