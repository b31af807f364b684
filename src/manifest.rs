use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;

use crate::job::JobSpec;
use crate::orchestrator::{OrchestratorOptions, ViewMode};

pub const MANIFEST_FILE: &str = "jobmux.toml";

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    jobs: IndexMap<String, RawJobDefinition>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    refresh_ms: Option<u64>,
    #[serde(default)]
    shutdown_grace_ms: Option<u64>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    mode: Option<ViewMode>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum RawJobDefinition {
    Argv(Vec<String>),
    Full(RawJob),
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJob {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    run: Option<Vec<String>>,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    env: IndexMap<String, String>,
}

#[derive(Debug)]
pub enum ManifestError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    InvalidJobName {
        name: String,
    },
    MissingCommand {
        job: String,
    },
    AmbiguousCommand {
        job: String,
    },
    InvalidSetting {
        key: &'static str,
        reason: &'static str,
    },
    NoJobs {
        path: PathBuf,
    },
    UnknownJob {
        name: String,
        available: Vec<String>,
    },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Read { path, error } => {
                write!(f, "failed to read manifest {}: {error}", path.display())
            }
            ManifestError::Parse { path, error } => {
                write!(f, "failed to parse manifest {}: {error}", path.display())
            }
            ManifestError::InvalidJobName { name } => write!(
                f,
                "job name {name:?} must be non-empty and free of control characters"
            ),
            ManifestError::MissingCommand { job } => {
                write!(f, "job `{job}` needs `command` or a non-empty `run` argv")
            }
            ManifestError::AmbiguousCommand { job } => {
                write!(f, "job `{job}` sets both `command` and `run`; pick one")
            }
            ManifestError::InvalidSetting { key, reason } => {
                write!(f, "invalid setting `settings.{key}`: {reason}")
            }
            ManifestError::NoJobs { path } => {
                write!(f, "manifest {} defines no jobs", path.display())
            }
            ManifestError::UnknownJob { name, available } => write!(
                f,
                "unknown job `{name}` (available: {})",
                available.join(", ")
            ),
        }
    }
}

impl std::error::Error for ManifestError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    pub jobs: Vec<JobSpec>,
    pub options: OrchestratorOptions,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let source = fs::read_to_string(path).map_err(|error| ManifestError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&source, path, &base_dir)
    }

    /// Parses manifest text. Relative job directories resolve against
    /// `base_dir`.
    pub fn parse(source: &str, path: &Path, base_dir: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(source).map_err(|error| ManifestError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        if raw.jobs.is_empty() {
            return Err(ManifestError::NoJobs {
                path: path.to_path_buf(),
            });
        }

        let options = resolve_settings(raw.settings)?;
        let jobs = raw
            .jobs
            .into_iter()
            .map(|(name, definition)| resolve_job(name, definition, base_dir))
            .collect::<Result<Vec<JobSpec>, ManifestError>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            jobs,
            options,
        })
    }

    /// Keeps only the named jobs, in manifest order.
    pub fn select(&mut self, names: &[String]) -> Result<(), ManifestError> {
        if names.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.jobs.iter().any(|job| &job.name == *name))
        {
            return Err(ManifestError::UnknownJob {
                name: unknown.clone(),
                available: self.jobs.iter().map(|job| job.name.clone()).collect(),
            });
        }
        self.jobs.retain(|job| names.contains(&job.name));
        Ok(())
    }
}

fn resolve_settings(raw: RawSettings) -> Result<OrchestratorOptions, ManifestError> {
    let mut options = OrchestratorOptions::default();
    if let Some(refresh_ms) = raw.refresh_ms {
        if refresh_ms == 0 {
            return Err(ManifestError::InvalidSetting {
                key: "refresh_ms",
                reason: "must be greater than zero",
            });
        }
        options.refresh = Duration::from_millis(refresh_ms);
    }
    if let Some(grace_ms) = raw.shutdown_grace_ms {
        options.shutdown_grace = Duration::from_millis(grace_ms);
    }
    if let Some(page_size) = raw.page_size {
        if page_size == 0 {
            return Err(ManifestError::InvalidSetting {
                key: "page_size",
                reason: "must be greater than zero",
            });
        }
        options.page_size = page_size;
    }
    if let Some(mode) = raw.mode {
        options.view = mode;
    }
    Ok(options)
}

fn resolve_job(
    name: String,
    definition: RawJobDefinition,
    base_dir: &Path,
) -> Result<JobSpec, ManifestError> {
    if name.trim().is_empty() || name.chars().any(char::is_control) {
        return Err(ManifestError::InvalidJobName { name });
    }
    let raw = match definition {
        RawJobDefinition::Argv(argv) => RawJob {
            run: Some(argv),
            ..RawJob::default()
        },
        RawJobDefinition::Full(raw) => raw,
    };

    let (program, args) = match (raw.command, raw.run) {
        (Some(_), Some(_)) => return Err(ManifestError::AmbiguousCommand { job: name }),
        (Some(command), None) if !command.trim().is_empty() => (command, raw.args),
        (None, Some(mut argv)) if !argv.is_empty() && raw.args.is_empty() => {
            let program = argv.remove(0);
            (program, argv)
        }
        (None, Some(_)) if !raw.args.is_empty() => {
            return Err(ManifestError::AmbiguousCommand { job: name })
        }
        _ => return Err(ManifestError::MissingCommand { job: name }),
    };

    let cwd = match raw.cwd {
        Some(cwd) if cwd.is_absolute() => cwd,
        Some(cwd) => base_dir.join(cwd),
        None => base_dir.to_path_buf(),
    };

    let mut job = JobSpec::new(name, program).with_args(args).with_cwd(cwd);
    job.env = raw.env;
    Ok(job)
}

#[cfg(test)]
#[path = "tests/manifest_tests.rs"]
mod tests;
