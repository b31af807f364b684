use std::io::{BufRead, BufReader, ErrorKind, PipeReader};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};

use crate::job::{JobOutcome, JobSpec, JobStatus};
use crate::log_store::LogStore;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(40);

/// Cross-thread view of one running job, used to cancel it.
#[derive(Debug)]
pub struct JobHandle {
    name: String,
    pid: AtomicU32,
    exited: AtomicBool,
    cancel_requested: AtomicBool,
}

impl JobHandle {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            pid: AtomicU32::new(0),
            exited: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pid of the child, which is also its process group id.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// True once the child has been reaped or could not be spawned.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn signal_group(&self, signal: GroupSignal) -> bool {
        if self.has_exited() {
            return false;
        }
        let Some(pid) = self.pid() else {
            return false;
        };
        signal_process_group(pid, signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    NotRunning,
    Terminated,
    ForceKilled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownProgress {
    SendingTerm,
    Waiting,
    ForceKilling,
    Complete { total: usize, forced: usize },
}

/// Runs one job to completion on the calling thread, streaming its output
/// into the log store.
pub struct JobRunner {
    spec: JobSpec,
    store: Arc<LogStore>,
    handle: Arc<JobHandle>,
}

impl JobRunner {
    pub fn new(spec: JobSpec, store: Arc<LogStore>) -> Self {
        let handle = Arc::new(JobHandle::new(&spec.name));
        Self {
            spec,
            store,
            handle,
        }
    }

    pub fn handle(&self) -> Arc<JobHandle> {
        Arc::clone(&self.handle)
    }

    pub fn run(self) -> JobOutcome {
        let name = self.spec.name.clone();
        let (mut child, reader) = match spawn_job(&self.spec) {
            Ok(spawned) => spawned,
            Err(error) => {
                self.handle.exited.store(true, Ordering::SeqCst);
                tracing::warn!(job = %name, %error, "spawn failed");
                self.store.append(
                    &name,
                    format!(
                        "[jobmux] failed to spawn `{}`: {error}",
                        self.spec.command_line()
                    ),
                );
                return self.finish(JobOutcome::failed(&name, format!("spawn failed: {error}")));
            }
        };

        self.handle.pid.store(child.id(), Ordering::SeqCst);
        tracing::debug!(job = %name, pid = child.id(), "spawned");
        if self.handle.cancel_requested() {
            // A cancel raced the spawn; the group exists now, so honor it.
            self.handle.signal_group(GroupSignal::Terminate);
        }

        let stream_error = self.stream_output(reader);
        if stream_error.is_some() {
            // Reading stopped early; nothing may be left running unobserved.
            self.handle.signal_group(GroupSignal::Kill);
        }
        let waited = child.wait();
        self.handle.exited.store(true, Ordering::SeqCst);

        let outcome = match (stream_error, waited) {
            (Some(error), _) => {
                JobOutcome::failed(&name, format!("output stream error: {error}"))
            }
            (None, Ok(status)) => self.outcome_for_status(status),
            (None, Err(error)) => {
                self.store
                    .append(&name, format!("[jobmux] failed waiting for exit: {error}"));
                JobOutcome::failed(&name, format!("wait failed: {error}"))
            }
        };
        tracing::debug!(job = %name, outcome = %outcome.describe(), "finished");
        self.finish(outcome)
    }

    fn stream_output(&self, reader: PipeReader) -> Option<std::io::Error> {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        self.store.append(&self.spec.name, line);
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    self.store.append(
                        &self.spec.name,
                        format!("[jobmux] output stream error: {error}"),
                    );
                    return Some(error);
                }
            }
        }
    }

    fn outcome_for_status(&self, status: ExitStatus) -> JobOutcome {
        let name = &self.spec.name;
        if status.success() {
            return JobOutcome::completed(name);
        }
        if self.handle.cancel_requested() {
            return JobOutcome::failed(name, "terminated");
        }
        JobOutcome::failed(name, describe_exit(status))
    }

    fn finish(&self, outcome: JobOutcome) -> JobOutcome {
        self.store
            .set_status(&outcome.name, outcome.status, outcome.detail.clone());
        outcome
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }
    "exit status unknown".to_owned()
}

fn spawn_job(spec: &JobSpec) -> std::io::Result<(Child, PipeReader)> {
    let (reader, writer) = std::io::pipe()?;
    let mut process = ProcessCommand::new(&spec.program);
    process
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::new(ErrorKind::Other, error.to_string()))
        });
    }
    let child = process.spawn()?;
    // The command still owns both write ends; end of stream only arrives once
    // every copy outside the child group is closed.
    drop(process);
    Ok((child, reader))
}

/// Terminates the job's whole process group: SIGTERM, then SIGKILL if the job
/// has not exited within `grace`.
pub fn cancel(handle: &JobHandle, grace: Duration) -> CancelOutcome {
    handle.cancel_requested.store(true, Ordering::SeqCst);
    if handle.has_exited() {
        return CancelOutcome::NotRunning;
    }
    tracing::info!(job = %handle.name(), "sending SIGTERM to process group");
    handle.signal_group(GroupSignal::Terminate);
    if wait_for_exit(std::slice::from_ref(&handle), grace) {
        return CancelOutcome::Terminated;
    }
    tracing::warn!(job = %handle.name(), "grace period elapsed, sending SIGKILL");
    handle.signal_group(GroupSignal::Kill);
    CancelOutcome::ForceKilled
}

/// Cancels every job still running with one shared grace deadline.
pub fn cancel_all<F>(handles: &[Arc<JobHandle>], grace: Duration, mut on_progress: F)
where
    F: FnMut(ShutdownProgress),
{
    let running = handles
        .iter()
        .filter(|handle| !handle.has_exited())
        .collect::<Vec<&Arc<JobHandle>>>();

    on_progress(ShutdownProgress::SendingTerm);
    for handle in &running {
        handle.cancel_requested.store(true, Ordering::SeqCst);
        handle.signal_group(GroupSignal::Terminate);
    }

    on_progress(ShutdownProgress::Waiting);
    let refs = running
        .iter()
        .map(|handle| handle.as_ref())
        .collect::<Vec<&JobHandle>>();
    if wait_for_exit(&refs, grace) {
        on_progress(ShutdownProgress::Complete {
            total: running.len(),
            forced: 0,
        });
        return;
    }

    on_progress(ShutdownProgress::ForceKilling);
    let mut forced = 0usize;
    for handle in &running {
        if handle.signal_group(GroupSignal::Kill) {
            tracing::warn!(job = %handle.name(), "force killed after grace period");
            forced += 1;
        }
    }
    on_progress(ShutdownProgress::Complete {
        total: running.len(),
        forced,
    });
}

fn wait_for_exit(handles: &[&JobHandle], grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if handles.iter().all(|handle| handle.has_exited()) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn signal_process_group(pid: u32, signal: GroupSignal) -> bool {
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match i32::try_from(pid) {
        Ok(pid) if pid > 0 => kill(Pid::from_raw(-pid), signal).is_ok(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32, _signal: GroupSignal) -> bool {
    false
}

/// Records the failure of a runner thread that panicked instead of returning
/// an outcome. A status the runner already recorded wins.
pub(crate) fn record_runner_panic(store: &LogStore, job: &str, message: &str) -> JobOutcome {
    let detail = format!("runner panicked: {message}");
    store.append(job, format!("[jobmux] {detail}"));
    if store.set_status(job, JobStatus::Failed, Some(detail.clone())) {
        return JobOutcome::failed(job, detail);
    }
    JobOutcome {
        name: job.to_owned(),
        status: store.status(job).unwrap_or(JobStatus::Failed),
        detail: store.detail(job),
    }
}
