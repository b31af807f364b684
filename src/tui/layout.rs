//! Screen composition for the multiplexer. Everything here is pure so frames
//! can be checked without a terminal.

use crate::ansi::{decode, StyledRun};
use crate::job::JobStatus;

use super::config::{HEADER_ROWS, HELP_ROWS, STATUS_SEPARATOR};

const ACCENT: u8 = 5;

pub(crate) fn display_width(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn status_label(name: &str, status: JobStatus) -> String {
    format!("{} {name}", status.glyph())
}

fn status_color(status: JobStatus) -> u8 {
    match status {
        JobStatus::Running => 3,
        JobStatus::Completed => 2,
        JobStatus::Failed => 1,
    }
}

/// Greedily packs labels into rows no wider than `width`, separated by two
/// spaces. Returns label indices per row. A label wider than the whole row
/// gets a row to itself.
pub fn pack_status_rows(labels: &[String], width: usize) -> Vec<Vec<usize>> {
    let separator = display_width(STATUS_SEPARATOR);
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut used = 0usize;

    for (idx, label) in labels.iter().enumerate() {
        let label_width = display_width(label);
        let needed = if current.is_empty() {
            label_width
        } else {
            used + separator + label_width
        };
        if current.is_empty() || needed <= width {
            current.push(idx);
            used = needed;
        } else {
            rows.push(std::mem::take(&mut current));
            current.push(idx);
            used = label_width;
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

/// Rows left for log lines once header, status and help rows are reserved.
pub(crate) fn log_capacity(height: u16, status_rows: usize) -> usize {
    (height as usize).saturating_sub(HEADER_ROWS + status_rows + HELP_ROWS)
}

/// Cuts runs so their combined text is at most `width` characters.
pub fn truncate_runs(runs: Vec<StyledRun>, width: usize) -> Vec<StyledRun> {
    let mut remaining = width;
    let mut out = Vec::with_capacity(runs.len());
    for mut run in runs {
        if remaining == 0 {
            break;
        }
        let len = display_width(&run.text);
        if len > remaining {
            run.text = run.text.chars().take(remaining).collect();
            remaining = 0;
        } else {
            remaining -= len;
        }
        out.push(run);
    }
    out
}

pub(crate) struct ScreenInput<'a> {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) jobs: &'a [(String, JobStatus)],
    pub(crate) selected: usize,
    pub(crate) status_rows: &'a [Vec<usize>],
    /// The newest lines of the selected job, at most the log capacity.
    pub(crate) tail: &'a [String],
    pub(crate) total_lines: usize,
    pub(crate) quit_allowed: bool,
}

/// Lays out one frame as `(row, runs)` pairs, top to bottom.
pub(crate) fn compose_screen(input: &ScreenInput<'_>) -> Vec<(u16, Vec<StyledRun>)> {
    let width = input.width as usize;
    let height = input.height as usize;
    let mut rows: Vec<(u16, Vec<StyledRun>)> = Vec::new();
    if height == 0 || width == 0 {
        return rows;
    }

    rows.push((0, truncate_runs(header_runs(input), width)));

    let log_rows = log_capacity(input.height, input.status_rows.len());
    let visible = &input.tail[input.tail.len().saturating_sub(log_rows)..];
    for (offset, line) in visible.iter().enumerate() {
        let row = HEADER_ROWS + offset;
        rows.push((row as u16, truncate_runs(decode(line), width)));
    }

    let status_top = height.saturating_sub(HELP_ROWS + input.status_rows.len());
    for (offset, entries) in input.status_rows.iter().enumerate() {
        let row = status_top + offset;
        if row < HEADER_ROWS || row >= height {
            continue;
        }
        rows.push((row as u16, truncate_runs(status_row_runs(input, entries), width)));
    }

    if height > HEADER_ROWS {
        rows.push(((height - 1) as u16, truncate_runs(help_runs(input), width)));
    }
    rows
}

fn header_runs(input: &ScreenInput<'_>) -> Vec<StyledRun> {
    let mut runs = vec![StyledRun::colored(" jobmux ", ACCENT).bold()];
    let Some((name, status)) = input.jobs.get(input.selected) else {
        runs.push(StyledRun::plain(" no jobs"));
        return runs;
    };
    runs.push(StyledRun::plain(format!(
        " {}/{} ",
        input.selected + 1,
        input.jobs.len()
    )));
    runs.push(StyledRun::plain(name.clone()).bold());
    runs.push(StyledRun::plain(" "));
    runs.push(StyledRun::colored(
        format!("{} {}", status.glyph(), status.label()),
        status_color(*status),
    ));
    runs.push(StyledRun::plain(format!("  {} lines", input.total_lines)));
    runs
}

fn status_row_runs(input: &ScreenInput<'_>, entries: &[usize]) -> Vec<StyledRun> {
    let mut runs = Vec::new();
    for (position, &idx) in entries.iter().enumerate() {
        let Some((name, status)) = input.jobs.get(idx) else {
            continue;
        };
        if position > 0 {
            runs.push(StyledRun::plain(STATUS_SEPARATOR));
        }
        runs.push(StyledRun::colored(status.glyph().to_string(), status_color(*status)));
        let label = StyledRun::plain(format!(" {name}"));
        if idx == input.selected {
            runs.push(StyledRun {
                fg: Some(ACCENT),
                ..label.bold()
            });
        } else {
            runs.push(label);
        }
    }
    runs
}

fn help_runs(input: &ScreenInput<'_>) -> Vec<StyledRun> {
    let quit = if input.quit_allowed {
        "q quit"
    } else {
        "q quit (once all jobs finish)"
    };
    vec![StyledRun::plain(format!(
        "←/→ switch job  r refresh  {quit}  ctrl+c cancel"
    ))]
}

#[cfg(test)]
#[path = "../tests/layout_tests.rs"]
mod tests;
