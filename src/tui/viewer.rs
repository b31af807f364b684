use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::log_store::LogStore;

use super::config::INTERRUPT_POLL_INTERVAL;
use super::core::{ViewState, ViewerKey};
use super::layout::{compose_screen, log_capacity, pack_status_rows, status_label, ScreenInput};
use super::surface::TerminalSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerMode {
    /// Jobs are already finished: no refresh timer, input only.
    Static,
    /// Redraw at least every `refresh` while any job is still running.
    Realtime { refresh: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerExit {
    Quit,
    Interrupted,
}

/// Full-screen log multiplexer over a [`LogStore`].
pub struct Multiplexer<'a, S: TerminalSurface> {
    surface: &'a mut S,
    store: &'a LogStore,
    mode: ViewerMode,
    interrupt: Option<&'a AtomicBool>,
    state: ViewState,
}

impl<'a, S: TerminalSurface> Multiplexer<'a, S> {
    pub fn new(surface: &'a mut S, store: &'a LogStore, mode: ViewerMode) -> Self {
        let job_count = store.statuses().len();
        Self {
            surface,
            store,
            mode,
            interrupt: None,
            state: ViewState::new(job_count),
        }
    }

    /// Leaves the loop with [`ViewerExit::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn run(&mut self) -> io::Result<ViewerExit> {
        loop {
            if self.interrupted() {
                return Ok(ViewerExit::Interrupted);
            }
            self.render()?;
            let Some(key) = self.surface.poll_key(self.wait_timeout())? else {
                continue;
            };
            if let Some(exit) = self.handle_key(key) {
                return Ok(exit);
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Real-time mode keeps its timer only while some job is running. With an
    /// interrupt flag attached the wait never blocks longer than
    /// `INTERRUPT_POLL_INTERVAL`, so a signal is noticed without a key press.
    fn wait_timeout(&self) -> Option<Duration> {
        let timeout = match self.mode {
            ViewerMode::Static => None,
            ViewerMode::Realtime { refresh } if !self.store.all_terminal() => Some(refresh),
            ViewerMode::Realtime { .. } => None,
        };
        if self.interrupt.is_none() {
            return timeout;
        }
        Some(timeout.map_or(INTERRUPT_POLL_INTERVAL, |timeout| {
            timeout.min(INTERRUPT_POLL_INTERVAL)
        }))
    }

    fn quit_allowed(&self) -> bool {
        match self.mode {
            ViewerMode::Static => true,
            ViewerMode::Realtime { .. } => self.store.all_terminal(),
        }
    }

    /// Applies one key. Returns the exit when the loop should stop.
    pub fn handle_key(&mut self, key: ViewerKey) -> Option<ViewerExit> {
        match key {
            ViewerKey::Previous => self.state.select_previous(),
            ViewerKey::Next => self.state.select_next(),
            ViewerKey::Refresh => {}
            ViewerKey::Quit => {
                if self.quit_allowed() {
                    return Some(ViewerExit::Quit);
                }
                tracing::debug!("quit ignored while jobs are running");
            }
            ViewerKey::Interrupt => return Some(ViewerExit::Interrupted),
        }
        None
    }

    pub fn render(&mut self) -> io::Result<()> {
        let (width, height) = self.surface.dimensions()?;
        let jobs = self.store.statuses();
        let labels = jobs
            .iter()
            .map(|(name, status)| status_label(name, *status))
            .collect::<Vec<String>>();
        let status_rows = pack_status_rows(&labels, width as usize);
        let log_rows = log_capacity(height, status_rows.len());

        let selected = self.state.selected();
        let (tail, total_lines) = match jobs.get(selected) {
            Some((name, _)) => (
                self.store.tail(name, log_rows),
                self.store.line_count(name),
            ),
            None => (Vec::new(), 0),
        };
        self.state
            .update_layout((width, height), total_lines, log_rows);

        let screen = compose_screen(&ScreenInput {
            width,
            height,
            jobs: &jobs,
            selected,
            status_rows: &status_rows,
            tail: &tail,
            total_lines,
            quit_allowed: self.quit_allowed(),
        });
        self.surface.clear()?;
        for (row, runs) in &screen {
            self.surface.write_line(*row, runs)?;
        }
        self.surface.present()
    }
}

#[cfg(test)]
#[path = "../tests/viewer_tests.rs"]
mod tests;
