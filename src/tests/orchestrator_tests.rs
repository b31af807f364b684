use super::*;
use crate::ui::PlainRenderer;

fn headless() -> OrchestratorOptions {
    OrchestratorOptions {
        shutdown_grace: Duration::from_millis(500),
        interactive: false,
        ..OrchestratorOptions::default()
    }
}

fn run_headless(jobs: Vec<JobSpec>) -> (RunSummary, Arc<LogStore>, String) {
    let orchestrator = Orchestrator::new(jobs, headless()).expect("orchestrator");
    let store = orchestrator.store();
    let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
    let summary = orchestrator.run(&mut renderer).expect("run");
    let output = String::from_utf8(renderer.into_inner()).expect("utf8");
    (summary, store, output)
}

#[test]
fn rejects_empty_and_duplicate_job_lists() {
    assert!(matches!(
        Orchestrator::new(Vec::new(), headless()),
        Err(OrchestratorError::NoJobs)
    ));
    let err = Orchestrator::new(
        vec![JobSpec::shell("a", "true"), JobSpec::shell("a", "true")],
        headless(),
    )
    .err()
    .expect("duplicate");
    assert_eq!(err.to_string(), "job `a` is defined twice");
}

#[test]
fn outcomes_follow_registration_order_and_exit_status() {
    let (summary, store, _) = run_headless(vec![
        JobSpec::shell("slow", "sleep 0.3; echo slow-done"),
        JobSpec::shell("fails", "echo boom; exit 3"),
        JobSpec::shell("fast", "echo fast-done"),
    ]);

    let names = summary
        .outcomes
        .iter()
        .map(|outcome| outcome.name.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(names, vec!["slow", "fails", "fast"]);
    assert_eq!(summary.outcomes[0].status, JobStatus::Completed);
    assert_eq!(
        summary.outcomes[1],
        JobOutcome::failed("fails", "exit code 3")
    );
    assert_eq!(summary.outcomes[2].status, JobStatus::Completed);
    assert!(!summary.interrupted);
    assert_eq!(summary.exit_code(), 0);

    assert_eq!(store.snapshot("slow"), vec!["slow-done"]);
    assert_eq!(store.snapshot("fails"), vec!["boom"]);
    assert!(store.all_terminal());
}

#[test]
fn spawn_failure_is_a_failed_job_not_a_run_error() {
    let (summary, store, _) = run_headless(vec![
        JobSpec::new("ghost", "/definitely/not/a/binary"),
        JobSpec::shell("ok", "true"),
    ]);
    assert_eq!(summary.outcomes[0].status, JobStatus::Failed);
    assert!(summary.outcomes[0]
        .detail
        .as_deref()
        .is_some_and(|detail| detail.starts_with("spawn failed")));
    assert_eq!(summary.outcomes[1].status, JobStatus::Completed);
    assert!(store.snapshot("ghost")[0].contains("failed to spawn"));
}

#[test]
fn preset_interrupt_cancels_running_jobs() {
    let orchestrator = Orchestrator::new(
        vec![
            JobSpec::shell("sleeper", "sleep 30"),
            JobSpec::shell("quick", "true"),
        ],
        headless(),
    )
    .expect("orchestrator");
    let flag = orchestrator.interrupt_flag();
    let setter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        flag.store(true, Ordering::SeqCst);
    });
    let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
    let started = Instant::now();
    let summary = orchestrator.run(&mut renderer).expect("run");
    setter.join().expect("setter");

    assert!(summary.interrupted);
    assert_eq!(summary.exit_code(), 130);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        summary.outcomes[0],
        JobOutcome::failed("sleeper", "terminated")
    );
    assert_eq!(summary.outcomes[1].status, JobStatus::Completed);

    let output = String::from_utf8(renderer.into_inner()).expect("utf8");
    assert!(output.contains("interrupted: stopped 1 running job(s)"));
}

#[test]
fn interrupt_cancels_jobs_while_the_prompt_waits_for_input() {
    let store = Arc::new(LogStore::new());
    store.register("sleeper");
    let runner = JobRunner::new(
        JobSpec::shell("sleeper", "echo ready; exec sleep 30"),
        Arc::clone(&store),
    );
    let handle = runner.handle();
    let worker = thread::spawn(move || runner.run());
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.line_count("sleeper") == 0 {
        assert!(Instant::now() < deadline, "job never started");
        thread::sleep(Duration::from_millis(20));
    }
    let pgid = handle.pid().expect("pid");

    let grace = Duration::from_millis(500);
    let flag = Arc::new(AtomicBool::new(false));
    let watcher = InterruptWatcher::spawn(vec![Arc::clone(&handle)], Arc::clone(&flag), grace)
        .expect("watcher");

    // Nothing is ever written, so the prompt stays blocked on its read.
    let (reader, writer) = io::pipe().expect("pipe");
    let input = InterruptibleInput::spawn(reader, &flag).expect("input thread");
    let mut viewer =
        PlainViewer::new(&store, BufReader::new(input), Vec::<u8>::new()).with_interrupt(&flag);

    let exit = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::SeqCst);
            let cancelled_by = Instant::now() + grace + Duration::from_millis(500);
            while !handle.has_exited() {
                assert!(Instant::now() < cancelled_by, "job outlived the grace period");
                thread::sleep(Duration::from_millis(20));
            }
        });
        viewer.run().expect("viewer")
    });
    drop(writer);

    assert_eq!(exit, ViewerExit::Interrupted);
    assert_eq!(
        watcher.finish(),
        Some(ShutdownReport {
            running: 1,
            forced: 0
        })
    );
    assert_eq!(
        worker.join().expect("runner thread"),
        JobOutcome::failed("sleeper", "terminated")
    );
    let pgid = nix::unistd::Pid::from_raw(i32::try_from(pgid).expect("pgid"));
    assert!(nix::sys::signal::killpg(pgid, None).is_err());
}

#[test]
fn watcher_without_interrupt_cancels_nothing() {
    let watcher = InterruptWatcher::spawn(
        Vec::new(),
        Arc::new(AtomicBool::new(false)),
        Duration::from_millis(100),
    )
    .expect("watcher");
    assert_eq!(watcher.finish(), None);
}

#[test]
fn summary_counts_and_json_shape() {
    let summary = RunSummary {
        outcomes: vec![
            JobOutcome::completed("a"),
            JobOutcome::failed("b", "signal 9"),
        ],
        interrupted: false,
    };
    let counts = summary.counts();
    assert_eq!((counts.completed, counts.failed), (1, 1));

    let json = serde_json::to_value(&summary).expect("json");
    assert_eq!(json["interrupted"], false);
    assert_eq!(json["outcomes"][0]["status"], "completed");
    assert!(json["outcomes"][0].get("detail").is_none());
    assert_eq!(json["outcomes"][1]["detail"], "signal 9");
}

#[test]
fn collector_falls_back_to_store_for_missing_results() {
    let store = LogStore::new();
    store.register("reported");
    store.register("recorded");
    store.register("silent");
    store.set_status("recorded", JobStatus::Completed, None);

    let (sender, receiver) = mpsc::channel();
    let mut collector = ResultCollector::new(receiver, 3);
    sender
        .send((0, JobOutcome::failed("reported", "exit code 1")))
        .expect("send");
    drop(sender);

    assert_eq!(collector.wait(None, None, |_| {}), WaitResult::Done);
    assert_eq!(collector.pending(), 2);
    let outcomes = collector.finish(&store);
    assert_eq!(outcomes[0], JobOutcome::failed("reported", "exit code 1"));
    assert_eq!(outcomes[1], JobOutcome::completed("recorded"));
    assert_eq!(outcomes[2].status, JobStatus::Failed);
    assert_eq!(store.status("silent"), Some(JobStatus::Failed));
}

#[test]
fn view_mode_names_round_trip() {
    for mode in [ViewMode::Live, ViewMode::Review, ViewMode::Plain] {
        assert_eq!(ViewMode::parse(mode.as_str()), Some(mode));
    }
    assert_eq!(ViewMode::parse("fancy"), None);
}
