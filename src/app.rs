use std::io::{self, Write};
use std::path::PathBuf;

use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::orchestrator::{install_interrupt_handlers, Orchestrator, OrchestratorError};
use crate::summary::{render_job_table, render_run_summary, write_json_summary};
use crate::ui::{KeyValue, OutputMode, PlainRenderer, Renderer, UiError};
use crate::{Command, JobsArgs, RunArgs};

#[derive(Debug)]
pub enum AppError {
    Manifest(ManifestError),
    Orchestrator(OrchestratorError),
    Signals(io::Error),
    Ui(UiError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Manifest(error) => write!(f, "{error}"),
            AppError::Orchestrator(error) => write!(f, "{error}"),
            AppError::Signals(error) => write!(f, "failed to install signal handlers: {error}"),
            AppError::Ui(error) => write!(f, "failed to write output: {error}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ManifestError> for AppError {
    fn from(value: ManifestError) -> Self {
        Self::Manifest(value)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(value: OrchestratorError) -> Self {
        Self::Orchestrator(value)
    }
}

impl From<UiError> for AppError {
    fn from(value: UiError) -> Self {
        Self::Ui(value)
    }
}

impl AppError {
    pub fn title(&self) -> &'static str {
        match self {
            AppError::Manifest(_) => "Manifest invalid",
            AppError::Orchestrator(_) => "Run could not start",
            AppError::Signals(_) => "Run could not start",
            AppError::Ui(_) => "Output failed",
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            AppError::Manifest(ManifestError::Read { .. }) => Some(format!(
                "Create `{MANIFEST_FILE}` or pass `--manifest <PATH>`"
            )),
            AppError::Manifest(ManifestError::UnknownJob { .. }) => {
                Some("Run `jobmux jobs` to list configured jobs".to_owned())
            }
            _ => None,
        }
    }
}

/// Executes a parsed command and returns the process exit code.
pub fn run_command(cmd: Command) -> Result<i32, AppError> {
    match cmd {
        Command::Run(args) => run_jobs(args),
        Command::Jobs(args) => list_jobs(args),
        Command::Help => {
            crate::print_usage();
            Ok(0)
        }
    }
}

fn manifest_path(override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| PathBuf::from(MANIFEST_FILE))
}

fn run_jobs(args: RunArgs) -> Result<i32, AppError> {
    let mut manifest = Manifest::load(&manifest_path(args.manifest))?;
    manifest.select(&args.only)?;

    let mut options = manifest.options.clone();
    if let Some(mode) = args.mode {
        options.view = mode;
    }
    if args.json {
        options.interactive = false;
    }

    let orchestrator = Orchestrator::new(manifest.jobs, options)?;
    install_interrupt_handlers(&orchestrator.interrupt_flag()).map_err(AppError::Signals)?;

    let output_mode = OutputMode::from_env();
    let mut progress = PlainRenderer::stderr(output_mode);
    let summary = orchestrator.run(&mut progress)?;

    if args.json {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        write_json_summary(&mut lock, &summary)?;
        lock.flush().map_err(UiError::from)?;
    } else {
        let mut renderer = PlainRenderer::stdout(output_mode);
        render_run_summary(&mut renderer, &summary)?;
    }
    Ok(summary.exit_code())
}

fn list_jobs(args: JobsArgs) -> Result<i32, AppError> {
    let manifest = Manifest::load(&manifest_path(args.manifest))?;
    let mut renderer = PlainRenderer::stdout(OutputMode::from_env());
    renderer.key_values(&[
        KeyValue::new("manifest", manifest.path.display().to_string()),
        KeyValue::new("mode", manifest.options.view.as_str()),
        KeyValue::new("jobs", manifest.jobs.len().to_string()),
    ])?;
    render_job_table(&mut renderer, &manifest.jobs)?;
    Ok(0)
}
