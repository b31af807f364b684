use std::io::Write;

use crate::job::JobSpec;
use crate::orchestrator::RunSummary;
use crate::ui::{Renderer, TableSpec, UiResult};

pub fn render_run_summary(renderer: &mut dyn Renderer, summary: &RunSummary) -> UiResult<()> {
    renderer.section("Job Results")?;
    for outcome in &summary.outcomes {
        renderer.job_result(outcome)?;
    }
    renderer.summary(summary.counts())
}

/// Pretty JSON followed by a newline.
pub fn write_json_summary<W: Write>(writer: &mut W, summary: &RunSummary) -> UiResult<()> {
    serde_json::to_writer_pretty(&mut *writer, summary)?;
    writeln!(writer)?;
    Ok(())
}

pub fn render_job_table(renderer: &mut dyn Renderer, jobs: &[JobSpec]) -> UiResult<()> {
    let rows = jobs
        .iter()
        .map(|job| {
            vec![
                job.name.clone(),
                job.command_line(),
                job.cwd.display().to_string(),
            ]
        })
        .collect::<Vec<Vec<String>>>();
    renderer.table(&TableSpec::new(
        vec!["job".to_owned(), "command".to_owned(), "cwd".to_owned()],
        rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOutcome;
    use crate::ui::PlainRenderer;

    fn sample() -> RunSummary {
        RunSummary {
            outcomes: vec![
                JobOutcome::completed("alpha"),
                JobOutcome::failed("beta", "exit code 2"),
                JobOutcome::failed("gamma", "terminated"),
            ],
            interrupted: true,
        }
    }

    #[test]
    fn summary_lists_every_job_with_its_cause() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        render_run_summary(&mut renderer, &sample()).expect("render");
        let out = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert!(out.starts_with("Job Results\n"));
        assert!(out.contains("✓ alpha  completed\n"));
        assert!(out.contains("✗ beta  failed (exit code 2)\n"));
        assert!(out.contains("✗ gamma  failed (terminated)\n"));
        assert!(out.ends_with("summary  jobs:3  completed:1  failed:2  interrupted\n"));
    }

    #[test]
    fn json_summary_parses_back() {
        let mut buffer = Vec::new();
        write_json_summary(&mut buffer, &sample()).expect("json");
        let value: serde_json::Value = serde_json::from_slice(&buffer).expect("parse");
        assert_eq!(value["interrupted"], true);
        assert_eq!(value["outcomes"].as_array().map(Vec::len), Some(3));
        assert_eq!(value["outcomes"][2]["status"], "failed");
    }

    #[test]
    fn job_table_shows_command_lines() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        let jobs = vec![
            JobSpec::new("alpha", "python3")
                .with_args(["scrape.py", "alpha"])
                .with_cwd("/srv/scrapers"),
            JobSpec::shell("beta", "echo hi"),
        ];
        render_job_table(&mut renderer, &jobs).expect("table");
        let out = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert!(out.contains("python3 scrape.py alpha"));
        assert!(out.contains("/srv/scrapers"));
        assert!(out.contains("sh -c 'echo hi'"));
    }
}
