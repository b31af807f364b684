use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

/// One independently runnable unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: IndexMap<String, String>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: PathBuf::from("."),
            env: IndexMap::new(),
        }
    }

    /// Shorthand for a job that runs `script` through `sh -c`.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, "sh").with_args(["-c".to_owned(), script.into()])
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<String>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_./=:,+@%".contains(ch));
    if plain {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn glyph(self) -> char {
        match self {
            JobStatus::Running => '~',
            JobStatus::Completed => '✓',
            JobStatus::Failed => '✗',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Final result of one job as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobOutcome {
    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Completed,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    /// `completed` or `failed (<detail>)`.
    pub fn describe(&self) -> String {
        match (&self.status, &self.detail) {
            (JobStatus::Failed, Some(detail)) => format!("failed ({detail})"),
            (status, _) => status.label().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_arguments_with_spaces() {
        let job = JobSpec::shell("a", "echo 'hi there'");
        assert_eq!(job.command_line(), "sh -c 'echo '\\''hi there'\\'''");
        let plain = JobSpec::new("b", "python3").with_args(["scrape.py", "--rate=2"]);
        assert_eq!(plain.command_line(), "python3 scrape.py --rate=2");
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn outcome_describes_failure_detail() {
        assert_eq!(JobOutcome::completed("a").describe(), "completed");
        assert_eq!(
            JobOutcome::failed("b", "exit code 1").describe(),
            "failed (exit code 1)"
        );
    }
}
