use crate::job::{JobOutcome, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub title: String,
    pub body: String,
    pub hint: Option<String>,
}

impl MessageBlock {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Totals shown under the per-job results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryCounts {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl SummaryCounts {
    pub fn from_outcomes(outcomes: &[JobOutcome], interrupted: bool) -> Self {
        let mut counts = Self {
            interrupted,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed | JobStatus::Running => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSpec {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_treat_unfinished_outcomes_as_failed() {
        let outcomes = vec![
            JobOutcome::completed("a"),
            JobOutcome::failed("b", "exit code 1"),
            JobOutcome {
                name: "c".to_owned(),
                status: JobStatus::Running,
                detail: None,
            },
        ];
        let counts = SummaryCounts::from_outcomes(&outcomes, true);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.total(), 3);
        assert!(counts.interrupted);
    }
}
