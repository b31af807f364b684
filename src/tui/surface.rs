use std::io::{self, IsTerminal};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;

use crate::ansi::StyledRun;
use crate::ui::theme::{resolve_color_enabled, OutputMode};

use super::core::ViewerKey;

/// Full-screen drawing and key input, as far as the multiplexer needs it.
///
/// Rows written between `clear` and `present` make up one frame; rows that
/// fall outside the current dimensions are dropped.
pub trait TerminalSurface {
    /// `(columns, rows)`.
    fn dimensions(&mut self) -> io::Result<(u16, u16)>;
    fn clear(&mut self) -> io::Result<()>;
    fn write_line(&mut self, row: u16, runs: &[StyledRun]) -> io::Result<()>;
    fn present(&mut self) -> io::Result<()>;
    /// Waits for a key for at most `timeout`, or indefinitely with `None`.
    fn poll_key(&mut self, timeout: Option<Duration>) -> io::Result<Option<ViewerKey>>;
    fn teardown(&mut self) -> io::Result<()>;
}

#[derive(Debug)]
pub enum SurfaceError {
    NotInteractive,
    Unsupported(String),
    Io(io::Error),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::NotInteractive => write!(f, "stdin/stdout is not an interactive terminal"),
            SurfaceError::Unsupported(term) => write!(f, "terminal `{term}` cannot run full-screen"),
            SurfaceError::Io(err) => write!(f, "terminal setup failed: {err}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<io::Error> for SurfaceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;

pub struct CrosstermSurface {
    terminal: TuiTerminal,
    pending: Vec<(u16, Line<'static>)>,
    color_enabled: bool,
    active: bool,
}

impl CrosstermSurface {
    pub fn init() -> Result<Self, SurfaceError> {
        if !io::stdout().is_terminal() || !io::stdin().is_terminal() {
            return Err(SurfaceError::NotInteractive);
        }
        if let Ok(term) = std::env::var("TERM") {
            if term == "dumb" {
                return Err(SurfaceError::Unsupported(term));
            }
        }

        enable_raw_mode()?;
        match Self::enter_screen() {
            Ok(terminal) => {
                let color_enabled = resolve_color_enabled(OutputMode::from_env(), true)
                    && crossterm::style::available_color_count() >= 8;
                tracing::debug!(color_enabled, "full-screen surface ready");
                Ok(Self {
                    terminal,
                    pending: Vec::new(),
                    color_enabled,
                    active: true,
                })
            }
            Err(error) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen, EnableLineWrap);
                let _ = disable_raw_mode();
                Err(SurfaceError::Io(error))
            }
        }
    }

    fn enter_screen() -> io::Result<TuiTerminal> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;
        terminal.clear()?;
        Ok(terminal)
    }
}

impl TerminalSurface for CrosstermSurface {
    fn dimensions(&mut self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }

    fn clear(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn write_line(&mut self, row: u16, runs: &[StyledRun]) -> io::Result<()> {
        self.pending
            .push((row, styled_line(runs, self.color_enabled)));
        Ok(())
    }

    fn present(&mut self) -> io::Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.terminal.draw(|frame| {
            let area = frame.area();
            for (row, line) in pending {
                if row >= area.height {
                    continue;
                }
                let target = Rect::new(area.x, area.y + row, area.width, 1);
                frame.render_widget(Paragraph::new(line), target);
            }
        })?;
        Ok(())
    }

    fn poll_key(&mut self, timeout: Option<Duration>) -> io::Result<Option<ViewerKey>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if !event::poll(remaining)? {
                    return Ok(None);
                }
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(mapped) = map_key(&key) {
                        return Ok(Some(mapped));
                    }
                }
                Event::Resize(_, _) => return Ok(Some(ViewerKey::Refresh)),
                _ => {}
            }
        }
    }

    fn teardown(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            EnableLineWrap
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

pub(crate) fn map_key(key: &KeyEvent) -> Option<ViewerKey> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        return Some(ViewerKey::Interrupt);
    }
    match key.code {
        KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') | KeyCode::Char('p') => {
            Some(ViewerKey::Previous)
        }
        KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') | KeyCode::Char('n') => {
            Some(ViewerKey::Next)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(ViewerKey::Quit),
        KeyCode::Char('r') => Some(ViewerKey::Refresh),
        _ => None,
    }
}

fn palette(index: u8) -> Color {
    match index {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::Gray,
    }
}

/// Converts decoded runs for drawing. Backgrounds are never drawn; foreground
/// colors are dropped when color is disabled.
pub(crate) fn styled_line(runs: &[StyledRun], color_enabled: bool) -> Line<'static> {
    let spans = runs
        .iter()
        .filter(|run| !run.text.is_empty())
        .map(|run| {
            let mut style = Style::default();
            if color_enabled {
                if let Some(fg) = run.fg {
                    style = style.fg(palette(fg));
                }
            }
            if run.bold {
                style = style.add_modifier(Modifier::BOLD);
            }
            Span::styled(sanitize_text(&run.text), style)
        })
        .collect::<Vec<Span<'static>>>();
    Line::from(spans)
}

/// Drops control characters (including stray escape bytes) that would move
/// the cursor or corrupt the frame. Tabs become a single space.
pub(crate) fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .filter_map(|ch| match ch {
            '\t' => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styled_line_keeps_foreground_and_bold_but_never_background() {
        let run = StyledRun {
            text: "OK".to_owned(),
            fg: Some(2),
            bg: Some(4),
            bold: true,
        };
        let line = styled_line(&[run], true);
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].style.fg, Some(Color::Green));
        assert_eq!(line.spans[0].style.bg, None);
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn styled_line_drops_color_silently_when_disabled() {
        let line = styled_line(&[StyledRun::colored("err", 1)], false);
        assert_eq!(line.spans[0].style.fg, None);
        assert_eq!(line.spans[0].content.as_ref(), "err");
    }

    #[test]
    fn sanitize_text_removes_escape_and_control_bytes() {
        assert_eq!(sanitize_text("a\u{1b}[2Kb\tc\u{7}"), "a[2Kb c");
    }

    #[test]
    fn key_map_covers_the_four_logical_actions() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(map_key(&key(KeyCode::Left)), Some(ViewerKey::Previous));
        assert_eq!(map_key(&key(KeyCode::Right)), Some(ViewerKey::Next));
        assert_eq!(map_key(&key(KeyCode::Char('q'))), Some(ViewerKey::Quit));
        assert_eq!(map_key(&key(KeyCode::Char('r'))), Some(ViewerKey::Refresh));
        assert_eq!(
            map_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ViewerKey::Interrupt)
        );
        assert_eq!(map_key(&key(KeyCode::Char('x'))), None);
    }
}
