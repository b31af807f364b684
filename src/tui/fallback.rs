//! Line-oriented viewer used when full-screen rendering is unavailable.

use std::io::{self, BufRead, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;

use crate::ansi::strip;
use crate::log_store::LogStore;

use super::config::INTERRUPT_POLL_INTERVAL;
use super::core::{next_index, prev_index};
use super::viewer::ViewerExit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Menu,
    Job(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageControl {
    Continue,
    Stop,
}

pub struct PlainViewer<'a, R: BufRead, W: Write> {
    store: &'a LogStore,
    input: R,
    output: W,
    page_size: usize,
    color_enabled: bool,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a, R: BufRead, W: Write> PlainViewer<'a, R, W> {
    pub fn new(store: &'a LogStore, input: R, output: W) -> Self {
        Self {
            store,
            input,
            output,
            page_size: super::config::DEFAULT_PAGE_SIZE,
            color_enabled: false,
            interrupt: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Prints raw lines (escapes intact) instead of stripped ones.
    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color_enabled = enabled;
        self
    }

    /// Checked around every command. Pair it with [`InterruptibleInput`] so a
    /// read waiting on the operator also gives up once the flag is set.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs the prompt until `q`, end of input, or the interrupt flag.
    pub fn run(&mut self) -> io::Result<ViewerExit> {
        let mut screen = Screen::Menu;
        self.print_menu()?;
        loop {
            if self.interrupted() {
                writeln!(self.output)?;
                return Ok(ViewerExit::Interrupted);
            }
            self.prompt(screen)?;
            let Some(command) = self.read_command()? else {
                writeln!(self.output)?;
                if self.interrupted() {
                    return Ok(ViewerExit::Interrupted);
                }
                return Ok(ViewerExit::Quit);
            };
            if self.interrupted() {
                return Ok(ViewerExit::Interrupted);
            }
            let job_count = self.store.statuses().len();
            match (screen, command.as_str()) {
                (_, "q" | "quit") => return Ok(ViewerExit::Quit),
                (Screen::Menu, "" | "r" | "refresh") => self.print_menu()?,
                (Screen::Menu, "n" | "next") if job_count > 0 => {
                    screen = self.open(0)?;
                }
                (Screen::Job(_), "b" | "back") => {
                    screen = Screen::Menu;
                    self.print_menu()?;
                }
                (Screen::Job(idx), "" | "r" | "refresh" | "t" | "tail") => {
                    self.print_tail(idx)?;
                }
                (Screen::Job(idx), "a" | "all") => self.print_all(idx)?,
                (Screen::Job(idx), "n" | "next") => {
                    screen = self.open(next_index(idx, job_count))?;
                }
                (Screen::Job(idx), "p" | "prev") => {
                    screen = self.open(prev_index(idx))?;
                }
                (_, other) => match other.parse::<usize>() {
                    Ok(number) if (1..=job_count).contains(&number) => {
                        screen = self.open(number - 1)?;
                    }
                    _ => writeln!(self.output, "unknown command `{other}`")?,
                },
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn open(&mut self, idx: usize) -> io::Result<Screen> {
        self.print_tail(idx)?;
        Ok(Screen::Job(idx))
    }

    fn read_command(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_ascii_lowercase()))
    }

    fn prompt(&mut self, screen: Screen) -> io::Result<()> {
        match screen {
            Screen::Menu => write!(self.output, "[1-N] select, r refresh, q quit> ")?,
            Screen::Job(idx) => {
                let name = self.job_name(idx).unwrap_or_default();
                write!(
                    self.output,
                    "{name}: t tail, a all, r refresh, n/p next/prev, b back, q quit> "
                )?
            }
        }
        self.output.flush()
    }

    fn job_name(&self, idx: usize) -> Option<String> {
        self.store
            .statuses()
            .into_iter()
            .nth(idx)
            .map(|(name, _)| name)
    }

    fn print_menu(&mut self) -> io::Result<()> {
        let jobs = self.store.statuses();
        let running = jobs
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .count();
        writeln!(self.output, "Jobs ({running} running)")?;
        for (idx, (name, status)) in jobs.iter().enumerate() {
            let lines = self.store.line_count(name);
            writeln!(
                self.output,
                "{:>3}. {} {name} ({lines} lines)",
                idx + 1,
                status.glyph()
            )?;
        }
        Ok(())
    }

    fn print_job_header(&mut self, idx: usize) -> io::Result<Option<String>> {
        let Some((name, status)) = self.store.statuses().into_iter().nth(idx) else {
            return Ok(None);
        };
        let mut header = format!("== {} {name} [{}]", status.glyph(), status.label());
        if let Some(detail) = self.store.detail(&name) {
            header.push_str(&format!(" {detail}"));
        }
        writeln!(self.output, "{header}")?;
        Ok(Some(name))
    }

    fn print_tail(&mut self, idx: usize) -> io::Result<()> {
        let Some(name) = self.print_job_header(idx)? else {
            return Ok(());
        };
        let total = self.store.line_count(&name);
        let lines = self.store.tail(&name, self.page_size);
        if total > lines.len() {
            writeln!(
                self.output,
                "... {} earlier lines (a to show all)",
                total - lines.len()
            )?;
        }
        for line in &lines {
            self.print_line(line)?;
        }
        Ok(())
    }

    fn print_all(&mut self, idx: usize) -> io::Result<()> {
        let Some(name) = self.print_job_header(idx)? else {
            return Ok(());
        };
        let lines = self.store.snapshot(&name);
        let pages = lines.chunks(self.page_size).collect::<Vec<&[String]>>();
        for (page_idx, page) in pages.iter().enumerate() {
            for line in page.iter() {
                self.print_line(line)?;
            }
            let is_last = page_idx + 1 == pages.len();
            if !is_last && self.wait_for_next_page()? == PageControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn wait_for_next_page(&mut self) -> io::Result<PageControl> {
        write!(self.output, "-- more (Enter continue, q stop) --")?;
        self.output.flush()?;
        match self.read_command()? {
            Some(command) if command == "q" => Ok(PageControl::Stop),
            Some(_) => Ok(PageControl::Continue),
            None => Ok(PageControl::Stop),
        }
    }

    fn print_line(&mut self, line: &str) -> io::Result<()> {
        if self.color_enabled {
            writeln!(self.output, "{line}\u{1b}[0m")
        } else {
            writeln!(self.output, "{}", strip(line))
        }
    }
}

/// Input fed by a reader thread, so a pending read ends as soon as the
/// interrupt flag is set instead of waiting for the next line. The reader
/// thread may stay blocked on its source after the viewer is gone.
pub struct InterruptibleInput<'a> {
    chunks: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    offset: usize,
    interrupt: &'a AtomicBool,
}

impl<'a> InterruptibleInput<'a> {
    pub fn spawn<R>(mut source: R, interrupt: &'a AtomicBool) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (sender, chunks) = mpsc::channel();
        thread::Builder::new()
            .name("jobmux-input".to_owned())
            .spawn(move || {
                let mut buffer = [0u8; 1024];
                loop {
                    let chunk = match source.read(&mut buffer) {
                        Ok(0) => return,
                        Ok(read) => Ok(buffer[..read].to_vec()),
                        Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                        Err(error) => Err(error),
                    };
                    let failed = chunk.is_err();
                    if sender.send(chunk).is_err() || failed {
                        return;
                    }
                }
            })?;
        Ok(Self {
            chunks,
            pending: Vec::new(),
            offset: 0,
            interrupt,
        })
    }
}

impl Read for InterruptibleInput<'_> {
    /// Reports end of input once the interrupt flag is set.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.pending.len() {
            if self.interrupt.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.chunks.recv_timeout(INTERRUPT_POLL_INTERVAL) {
                Ok(chunk) => {
                    self.pending = chunk?;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let available = &self.pending[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        Ok(count)
    }
}

#[cfg(test)]
#[path = "../tests/fallback_tests.rs"]
mod tests;
