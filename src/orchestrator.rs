use std::any::Any;
use std::collections::HashSet;
use std::io::{self, BufReader, IsTerminal};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::job::{JobOutcome, JobSpec, JobStatus};
use crate::log_store::LogStore;
use crate::process_manager::{cancel_all, record_runner_panic, JobHandle, JobRunner, ShutdownProgress};
use crate::tui::config::{
    DEFAULT_PAGE_SIZE, DEFAULT_REFRESH_INTERVAL, RESULT_POLL_WAIT, SHUTDOWN_GRACE_TIMEOUT,
};
use crate::tui::{
    CrosstermSurface, InterruptibleInput, Multiplexer, PlainViewer, TerminalSurface, ViewerExit,
    ViewerMode,
};
use crate::ui::theme::{resolve_color_enabled, OutputMode};
use crate::ui::{NoticeLevel, Renderer, SpinnerHandle, SummaryCounts};

/// Extra time allowed after SIGKILL for runners to report.
const POST_KILL_WAIT: Duration = Duration::from_secs(1);

/// How the operator watches a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Real-time multiplexer while jobs run.
    #[default]
    Live,
    /// Wait for every job, then inspect the finished logs.
    Review,
    /// Line-oriented prompt only.
    Plain,
}

impl ViewMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(ViewMode::Live),
            "review" => Some(ViewMode::Review),
            "plain" => Some(ViewMode::Plain),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Live => "live",
            ViewMode::Review => "review",
            ViewMode::Plain => "plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub view: ViewMode,
    pub refresh: Duration,
    pub shutdown_grace: Duration,
    pub page_size: usize,
    /// When false no viewer is opened and jobs are awaited directly.
    pub interactive: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            view: ViewMode::default(),
            refresh: DEFAULT_REFRESH_INTERVAL,
            shutdown_grace: SHUTDOWN_GRACE_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            interactive: true,
        }
    }
}

#[derive(Debug)]
pub enum OrchestratorError {
    NoJobs,
    DuplicateJob(String),
    ThreadSpawn { job: String, error: io::Error },
    WatcherSpawn(io::Error),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorError::NoJobs => write!(f, "no jobs to run"),
            OrchestratorError::DuplicateJob(name) => write!(f, "job `{name}` is defined twice"),
            OrchestratorError::ThreadSpawn { job, error } => {
                write!(f, "failed to start a thread for job `{job}`: {error}")
            }
            OrchestratorError::WatcherSpawn(error) => {
                write!(f, "failed to start the interrupt watcher: {error}")
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Final result of a run, in job registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<JobOutcome>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts::from_outcomes(&self.outcomes, self.interrupted)
    }

    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            130
        } else {
            0
        }
    }
}

/// Registers the process-wide SIGINT/SIGTERM handlers that set `flag`.
pub fn install_interrupt_handlers(flag: &Arc<AtomicBool>) -> io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(flag))?;
    }
    Ok(())
}

pub struct Orchestrator {
    jobs: Vec<JobSpec>,
    options: OrchestratorOptions,
    store: Arc<LogStore>,
    interrupt: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(jobs: Vec<JobSpec>, options: OrchestratorOptions) -> Result<Self, OrchestratorError> {
        if jobs.is_empty() {
            return Err(OrchestratorError::NoJobs);
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = jobs.iter().find(|job| !seen.insert(job.name.as_str())) {
            return Err(OrchestratorError::DuplicateJob(duplicate.name.clone()));
        }
        Ok(Self {
            jobs,
            options,
            store: Arc::new(LogStore::new()),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn store(&self) -> Arc<LogStore> {
        Arc::clone(&self.store)
    }

    /// Setting this flag cancels the run; signal handlers and tests share it.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Runs every job in parallel, supervises the viewer, and returns once
    /// each job has an outcome.
    pub fn run(self, renderer: &mut dyn Renderer) -> Result<RunSummary, OrchestratorError> {
        for job in &self.jobs {
            self.store.register(&job.name);
        }
        tracing::info!(
            jobs = self.jobs.len(),
            mode = self.options.view.as_str(),
            interactive = self.options.interactive,
            "starting run"
        );

        let StartedJobs {
            handles,
            threads,
            mut results,
        } = self.start_jobs()?;
        let watcher = match InterruptWatcher::spawn(
            handles.clone(),
            Arc::clone(&self.interrupt),
            self.options.shutdown_grace,
        ) {
            Ok(watcher) => watcher,
            Err(error) => {
                tracing::error!(%error, "interrupt watcher spawn failed");
                cancel_all(&handles, self.options.shutdown_grace, |_| {});
                return Err(OrchestratorError::WatcherSpawn(error));
            }
        };

        let mut interrupted = match self.supervise(&mut results, renderer) {
            ViewerExit::Interrupted => true,
            ViewerExit::Quit => self.interrupt.load(Ordering::SeqCst),
        };
        if !interrupted {
            interrupted = self.await_remaining(&mut results, renderer) == WaitResult::Interrupted;
        }

        if interrupted {
            self.interrupt.store(true, Ordering::SeqCst);
            self.shutdown(watcher, &handles, renderer);
            let deadline = Instant::now() + POST_KILL_WAIT;
            if results.wait(None, Some(deadline), |_| {}) == WaitResult::TimedOut {
                tracing::warn!(
                    pending = results.pending(),
                    "jobs still unreported after SIGKILL"
                );
            }
        } else if watcher.finish().is_some() {
            tracing::debug!("interrupt arrived after every job finished");
        }

        let complete = results.pending() == 0;
        let outcomes = results.finish(&self.store);
        if complete {
            for thread in threads {
                if thread.join().is_err() {
                    tracing::warn!("job thread ended with a panic after reporting");
                }
            }
        }
        tracing::info!(interrupted, "run finished");
        Ok(RunSummary {
            outcomes,
            interrupted,
        })
    }

    fn start_jobs(&self) -> Result<StartedJobs, OrchestratorError> {
        let (sender, receiver) = mpsc::channel::<(usize, JobOutcome)>();
        let mut handles = Vec::with_capacity(self.jobs.len());
        let mut threads = Vec::with_capacity(self.jobs.len());

        for (idx, spec) in self.jobs.iter().enumerate() {
            let name = spec.name.clone();
            let runner = JobRunner::new(spec.clone(), Arc::clone(&self.store));
            let handle = runner.handle();
            let store = Arc::clone(&self.store);
            let sender = sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("job-{name}"))
                .spawn(move || {
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| runner.run())) {
                        Ok(outcome) => outcome,
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(job = %name, %message, "runner panicked");
                            record_runner_panic(&store, &name, &message)
                        }
                    };
                    // The receiver may already be gone after a hard failure.
                    let _ = sender.send((idx, outcome));
                });
            match spawned {
                Ok(thread) => {
                    handles.push(handle);
                    threads.push(thread);
                }
                Err(error) => {
                    tracing::error!(job = %spec.name, %error, "thread spawn failed");
                    cancel_all(&handles, self.options.shutdown_grace, |_| {});
                    return Err(OrchestratorError::ThreadSpawn {
                        job: spec.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(StartedJobs {
            handles,
            threads,
            results: ResultCollector::new(receiver, self.jobs.len()),
        })
    }

    fn supervise(&self, results: &mut ResultCollector, renderer: &mut dyn Renderer) -> ViewerExit {
        if !self.options.interactive {
            return ViewerExit::Quit;
        }
        match self.options.view {
            ViewMode::Live => {
                let realtime = ViewerMode::Realtime {
                    refresh: self.options.refresh,
                };
                match self.full_screen(realtime) {
                    Some(exit) => exit,
                    None => self.plain_or_wait(results, renderer),
                }
            }
            ViewMode::Review => {
                if self.await_remaining(results, renderer) == WaitResult::Interrupted {
                    return ViewerExit::Interrupted;
                }
                match self.full_screen(ViewerMode::Static) {
                    Some(exit) => exit,
                    None if io::stdin().is_terminal() => self.plain_prompt(),
                    None => ViewerExit::Quit,
                }
            }
            ViewMode::Plain => self.plain_or_wait(results, renderer),
        }
    }

    /// `None` when the full-screen viewer cannot run here.
    fn full_screen(&self, mode: ViewerMode) -> Option<ViewerExit> {
        let mut surface = match CrosstermSurface::init() {
            Ok(surface) => surface,
            Err(error) => {
                tracing::info!(%error, "full-screen viewer unavailable, using plain viewer");
                return None;
            }
        };
        let exit = Multiplexer::new(&mut surface, &self.store, mode)
            .with_interrupt(&self.interrupt)
            .run();
        if let Err(error) = surface.teardown() {
            tracing::warn!(%error, "terminal teardown failed");
        }
        match exit {
            Ok(exit) => Some(exit),
            Err(error) => {
                tracing::warn!(%error, "full-screen viewer failed, using plain viewer");
                None
            }
        }
    }

    fn plain_or_wait(&self, results: &mut ResultCollector, renderer: &mut dyn Renderer) -> ViewerExit {
        if io::stdin().is_terminal() {
            return self.plain_prompt();
        }
        match self.await_remaining(results, renderer) {
            WaitResult::Interrupted => ViewerExit::Interrupted,
            WaitResult::Done | WaitResult::TimedOut => ViewerExit::Quit,
        }
    }

    fn plain_prompt(&self) -> ViewerExit {
        let input = match InterruptibleInput::spawn(io::stdin(), &self.interrupt) {
            Ok(input) => input,
            Err(error) => {
                tracing::warn!(%error, "input thread spawn failed, skipping the prompt");
                return ViewerExit::Quit;
            }
        };
        let stdout = io::stdout();
        let color = resolve_color_enabled(OutputMode::from_env(), stdout.is_terminal());
        let mut viewer = PlainViewer::new(&self.store, BufReader::new(input), stdout.lock())
            .with_page_size(self.options.page_size)
            .with_color(color)
            .with_interrupt(&self.interrupt);
        match viewer.run() {
            Ok(exit) => exit,
            Err(error) => {
                tracing::warn!(%error, "plain viewer stopped on an io error");
                ViewerExit::Quit
            }
        }
    }

    fn await_remaining(&self, results: &mut ResultCollector, renderer: &mut dyn Renderer) -> WaitResult {
        results.drain();
        if results.pending() == 0 {
            return WaitResult::Done;
        }
        let spinner = start_spinner(renderer, &waiting_message(results.pending()));
        let waited = results.wait(Some(&self.interrupt), None, |pending| {
            spinner.set_message(&waiting_message(pending));
        });
        match waited {
            WaitResult::Interrupted => spinner.finish_error("interrupted"),
            _ => spinner.finish_success("all jobs finished"),
        }
        waited
    }

    /// Waits for the watcher to finish cancelling and reports what it did.
    fn shutdown(
        &self,
        watcher: InterruptWatcher,
        handles: &[Arc<JobHandle>],
        renderer: &mut dyn Renderer,
    ) {
        let spinner = start_spinner(renderer, "stopping running jobs");
        let report = match watcher.finish() {
            Some(report) => report,
            None => cancel_running(handles, self.options.shutdown_grace),
        };
        if report.running == 0 {
            spinner.finish_success("no jobs were running");
            return;
        }
        spinner.finish_success(&format!(
            "stopped {} job(s), {} force-killed",
            report.running, report.forced
        ));
        let _ = renderer.notice(
            NoticeLevel::Warning,
            &format!("interrupted: stopped {} running job(s)", report.running),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShutdownReport {
    running: usize,
    forced: usize,
}

/// Cancels every job once the interrupt flag is set, independently of
/// whatever the viewer is blocked on.
struct InterruptWatcher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Option<ShutdownReport>>,
}

impl InterruptWatcher {
    fn spawn(
        handles: Vec<Arc<JobHandle>>,
        interrupt: Arc<AtomicBool>,
        grace: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("jobmux-interrupt".to_owned())
            .spawn(move || loop {
                if interrupt.load(Ordering::SeqCst) {
                    return Some(cancel_running(&handles, grace));
                }
                if stopped.load(Ordering::SeqCst) {
                    return None;
                }
                thread::sleep(RESULT_POLL_WAIT);
            })?;
        Ok(Self { stop, thread })
    }

    /// Stops watching. A cancellation already underway, or one due to a flag
    /// set before this call, runs to completion first. `None` when nothing
    /// was cancelled.
    fn finish(self) -> Option<ShutdownReport> {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!("interrupt watcher panicked");
                None
            }
        }
    }
}

fn cancel_running(handles: &[Arc<JobHandle>], grace: Duration) -> ShutdownReport {
    let running = handles.iter().filter(|handle| !handle.has_exited()).count();
    tracing::info!(running, "interrupt received, cancelling jobs");
    let mut forced = 0;
    cancel_all(handles, grace, |progress| match progress {
        ShutdownProgress::Complete { forced: count, .. } => forced = count,
        other => tracing::debug!(?other, "shutdown progress"),
    });
    ShutdownReport { running, forced }
}

struct StartedJobs {
    handles: Vec<Arc<JobHandle>>,
    threads: Vec<JoinHandle<()>>,
    results: ResultCollector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitResult {
    Done,
    Interrupted,
    TimedOut,
}

/// Outcomes arriving from runner threads, slotted by job index.
struct ResultCollector {
    receiver: Receiver<(usize, JobOutcome)>,
    slots: Vec<Option<JobOutcome>>,
    pending: usize,
}

impl ResultCollector {
    fn new(receiver: Receiver<(usize, JobOutcome)>, jobs: usize) -> Self {
        Self {
            receiver,
            slots: vec![None; jobs],
            pending: jobs,
        }
    }

    fn pending(&self) -> usize {
        self.pending
    }

    fn accept(&mut self, idx: usize, outcome: JobOutcome) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.is_none() {
                self.pending -= 1;
            }
            *slot = Some(outcome);
        }
    }

    fn drain(&mut self) {
        while let Ok((idx, outcome)) = self.receiver.try_recv() {
            self.accept(idx, outcome);
        }
    }

    /// Blocks until every outcome arrived, `interrupt` is set, or `deadline`
    /// passes. `on_result` gets the pending count after each arrival.
    fn wait<F>(
        &mut self,
        interrupt: Option<&AtomicBool>,
        deadline: Option<Instant>,
        mut on_result: F,
    ) -> WaitResult
    where
        F: FnMut(usize),
    {
        loop {
            if self.pending == 0 {
                return WaitResult::Done;
            }
            if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                return WaitResult::Interrupted;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return WaitResult::TimedOut;
            }
            match self.receiver.recv_timeout(RESULT_POLL_WAIT) {
                Ok((idx, outcome)) => {
                    self.accept(idx, outcome);
                    on_result(self.pending);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return WaitResult::Done,
            }
        }
    }

    /// Missing outcomes fall back to what the store recorded.
    fn finish(mut self, store: &LogStore) -> Vec<JobOutcome> {
        self.drain();
        let names = store
            .statuses()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<String>>();
        self.slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| slot.unwrap_or_else(|| fallback_outcome(store, &name)))
            .collect()
    }
}

fn fallback_outcome(store: &LogStore, name: &str) -> JobOutcome {
    match store.status(name) {
        Some(status) if status.is_terminal() => JobOutcome {
            name: name.to_owned(),
            status,
            detail: store.detail(name),
        },
        _ => {
            let detail = "runner did not report an outcome";
            store.set_status(name, JobStatus::Failed, Some(detail.to_owned()));
            JobOutcome::failed(name, detail)
        }
    }
}

fn start_spinner(renderer: &mut dyn Renderer, label: &str) -> Box<dyn SpinnerHandle> {
    match renderer.spinner(label) {
        Ok(spinner) => spinner,
        Err(error) => {
            tracing::debug!(%error, "spinner unavailable");
            Box::new(crate::ui::progress::NoopSpinnerHandle)
        }
    }
}

fn waiting_message(pending: usize) -> String {
    match pending {
        1 => "waiting for 1 job".to_owned(),
        n => format!("waiting for {n} jobs"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_owned()
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
