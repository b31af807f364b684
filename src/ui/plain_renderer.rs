use std::io::{IsTerminal, Write};

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;

use crate::job::{JobOutcome, JobStatus};
use crate::ui::progress::{IndicatifSpinnerHandle, NoopSpinnerHandle};
use crate::ui::renderer::{Renderer, SpinnerHandle, UiResult};
use crate::ui::table::render_table;
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, OutputMode, Theme};
use crate::ui::widgets::{KeyValue, MessageBlock, NoticeLevel, SummaryCounts, TableSpec};

pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress_enabled: bool,
    theme: Theme,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress_enabled: false,
            theme: Theme::default(),
        }
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }
}

fn color_choice(mode: OutputMode) -> ColorChoice {
    match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    }
}

impl PlainRenderer<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stdout(), color_choice(mode));
        let is_tty = std::io::stdout().is_terminal();
        let color_enabled = resolve_color_enabled(mode, is_tty);
        // Spinners draw on stderr; they only make sense when both ends are live.
        let progress_enabled =
            is_tty && std::io::stderr().is_terminal() && !is_ci_environment();
        Self::new(stream, color_enabled).with_progress_enabled(progress_enabled)
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stderr(), color_choice(mode));
        let is_tty = std::io::stderr().is_terminal();
        let color_enabled = resolve_color_enabled(mode, is_tty);
        Self::new(stream, color_enabled).with_progress_enabled(is_tty && !is_ci_environment())
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn section(&mut self, title: &str) -> UiResult<()> {
        let rendered = self.style_text(self.theme.accent, title);
        let underline = self.style_text(self.theme.muted, &"─".repeat(title.chars().count()));
        writeln!(self.writer, "{rendered}")?;
        writeln!(self.writer, "{underline}")?;
        Ok(())
    }

    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        writeln!(self.writer, "{marker} {label}: {body}")?;
        Ok(())
    }

    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        let marker = self.style_text(self.theme.error, "[error]");
        writeln!(self.writer, "{marker} {}", block.title)?;
        writeln!(self.writer, "  {}", block.body)?;
        if let Some(hint) = &block.hint {
            let hint_label = self.style_text(self.theme.muted, "hint");
            writeln!(self.writer, "  {hint_label}: {hint}")?;
        }
        Ok(())
    }

    fn key_values(&mut self, items: &[KeyValue]) -> UiResult<()> {
        for item in items {
            let key = self.style_text(self.theme.label, &item.key);
            writeln!(self.writer, "{key}: {}", item.value)?;
        }
        Ok(())
    }

    fn job_result(&mut self, outcome: &JobOutcome) -> UiResult<()> {
        let style = self.theme.status(outcome.status);
        let glyph = self.style_text(style, &outcome.status.glyph().to_string());
        let state = match outcome.status {
            JobStatus::Completed => outcome.describe(),
            _ => self.style_text(style, &outcome.describe()),
        };
        writeln!(self.writer, "{glyph} {}  {state}", outcome.name)?;
        Ok(())
    }

    fn summary(&mut self, counts: SummaryCounts) -> UiResult<()> {
        let completed = self.style_text(self.theme.success, &counts.completed.to_string());
        let failed = self.style_text(self.theme.error, &counts.failed.to_string());
        write!(
            self.writer,
            "summary  jobs:{}  completed:{completed}  failed:{failed}",
            counts.total()
        )?;
        if counts.interrupted {
            let marker = self.style_text(self.theme.warning, "interrupted");
            write!(self.writer, "  {marker}")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn table(&mut self, spec: &TableSpec) -> UiResult<()> {
        let rendered = render_table(spec);
        writeln!(self.writer, "{rendered}")?;
        Ok(())
    }

    fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>> {
        if self.progress_enabled {
            return Ok(Box::new(IndicatifSpinnerHandle::start(label)));
        }
        let marker = self.style_text(self.theme.accent, "◌");
        writeln!(self.writer, "{marker} {label}")?;
        Ok(Box::new(NoopSpinnerHandle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::renderer::Renderer;

    fn rendered(renderer: PlainRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).expect("utf8")
    }

    #[test]
    fn renders_error_block_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .error_block(
                &MessageBlock::new("Manifest invalid", "job `a` needs `command`")
                    .with_hint("Run `jobmux jobs` to list configured jobs"),
            )
            .expect("render error block");
        assert_eq!(
            rendered(renderer),
            "[error] Manifest invalid\n  job `a` needs `command`\n  hint: Run `jobmux jobs` to list configured jobs\n"
        );
    }

    #[test]
    fn renders_results_and_summary_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer.section("Job Results").expect("section");
        renderer
            .job_result(&JobOutcome::completed("alpha"))
            .expect("alpha");
        renderer
            .job_result(&JobOutcome::failed("beta", "exit code 1"))
            .expect("beta");
        renderer
            .summary(SummaryCounts {
                completed: 1,
                failed: 1,
                interrupted: true,
            })
            .expect("summary");

        assert_eq!(
            rendered(renderer),
            "Job Results\n───────────\n✓ alpha  completed\n✗ beta  failed (exit code 1)\nsummary  jobs:2  completed:1  failed:1  interrupted\n"
        );
    }

    #[test]
    fn colored_failure_wraps_status_in_escapes() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), true);
        renderer
            .job_result(&JobOutcome::failed("beta", "terminated"))
            .expect("beta");
        let out = rendered(renderer);
        assert!(out.contains("\u{1b}["));
        assert!(out.contains("beta"));
        assert!(out.contains("failed (terminated)"));
    }

    #[test]
    fn spinner_falls_back_to_a_line_when_progress_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false).with_progress_enabled(false);
        let spinner = renderer.spinner("Waiting for 3 jobs").expect("spinner");
        spinner.set_message("Waiting for 1 job");
        spinner.finish_success("done");
        assert_eq!(rendered(renderer), "◌ Waiting for 3 jobs\n");
    }

    #[test]
    fn renders_notice_and_key_values() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .notice(NoticeLevel::Warning, "full-screen viewer unavailable")
            .expect("notice");
        renderer
            .key_values(&[KeyValue::new("manifest", "jobmux.toml")])
            .expect("key values");
        assert_eq!(
            rendered(renderer),
            "• warn: full-screen viewer unavailable\nmanifest: jobmux.toml\n"
        );
    }
}
