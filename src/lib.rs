pub mod ansi;
pub mod app;
pub mod job;
pub mod log_store;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod process_manager;
pub mod summary;
pub mod tui;
pub mod ui;

use std::path::PathBuf;

use crate::orchestrator::ViewMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    Jobs(JobsArgs),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunArgs {
    pub manifest: Option<PathBuf>,
    pub only: Vec<String>,
    pub mode: Option<ViewMode>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobsArgs {
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingValue(&'static str),
    InvalidMode(String),
    UnknownArgument(String),
    UnknownCommand(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingValue(flag) => write!(f, "{flag} requires a value"),
            CliParseError::InvalidMode(mode) => {
                write!(f, "unknown mode `{mode}` (expected live, review or plain)")
            }
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
            CliParseError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "run" => parse_run(args),
        "jobs" => parse_jobs(args),
        other => Err(CliParseError::UnknownCommand(other.to_owned())),
    }
}

fn parse_run<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut run = RunArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--manifest" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--manifest"));
                };
                run.manifest = Some(PathBuf::from(path));
            }
            "--only" => {
                let Some(name) = args.next() else {
                    return Err(CliParseError::MissingValue("--only"));
                };
                run.only.push(name);
            }
            "--mode" => {
                let Some(mode) = args.next() else {
                    return Err(CliParseError::MissingValue("--mode"));
                };
                let Some(parsed) = ViewMode::parse(&mode) else {
                    return Err(CliParseError::InvalidMode(mode));
                };
                run.mode = Some(parsed);
            }
            "--json" => run.json = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }

    Ok(Command::Run(run))
}

fn parse_jobs<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut jobs = JobsArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--manifest" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--manifest"));
                };
                jobs.manifest = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }

    Ok(Command::Jobs(jobs))
}

pub fn print_usage() {
    eprintln!(
        "jobmux\n\nUSAGE:\n  jobmux run [--manifest <PATH>] [--only <NAME>]... [--mode live|review|plain] [--json]\n  jobmux jobs [--manifest <PATH>]\n\nCOMMANDS:\n  run               Start every job and watch their logs\n  jobs              List the jobs defined in the manifest\n\nOPTIONS (run):\n  --manifest <PATH> Manifest to load (default: ./jobmux.toml)\n  --only <NAME>     Run only this job; repeatable\n  --mode <MODE>     live: real-time viewer, review: view after all jobs finish, plain: prompt\n  --json            Print the run summary as JSON; no viewer is opened\n\nVIEWER KEYS:\n  ←/→ h/l Tab       Switch job\n  r                 Refresh\n  q, Esc            Quit (live mode: once all jobs finish)\n  Ctrl+C            Cancel running jobs\n\nENVIRONMENT:\n  JOBMUX_COLOR      auto | always | never (NO_COLOR disables color)\n  JOBMUX_LOG        tracing filter; enables file logging\n  JOBMUX_LOG_DIR    log directory (default: <tmp>/jobmux)\n\nGENERAL:\n  -h, --help        Print help\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
