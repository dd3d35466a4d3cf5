//! Integration tests for the job engine.
//!
//! Every test builds its own engine; ordering assertions use the global
//! sequence numbers recorded by [`common::Trace`].

mod common;

use common::{
    collect_progress, context, gated, run_to_completion, traced, traced_job, Ctx, Gate, Outcome,
    Trace, TIMEOUT,
};
use morpho_jobs::{
    BarrierItem, FnItem, ItemTransition, Job, JobContext, JobEngine, JobEngineConfig, JobError,
    JobItem, JobItemFlags, JobItemStatus, JobWorkspace, MessageKind,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

const NONE: JobItemFlags = JobItemFlags::NONE;
const ALONE: JobItemFlags = JobItemFlags::RUNS_ALONE;
const WAITS: JobItemFlags = JobItemFlags::WAITS_FOR_ALL_PREVIOUS;
const FATAL: JobItemFlags = JobItemFlags::FAILURES_ARE_FATAL;
const SHORT: Duration = Duration::from_millis(5);

#[test]
fn test_parallel_items_complete_as_multiset() {
    let engine = JobEngine::new(4).unwrap();
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE; 4], SHORT);

    run_to_completion(&engine, &job);

    let completed: BTreeSet<usize> = trace.completion_order().into_iter().collect();
    assert_eq!(completed, BTreeSet::from([0, 1, 2, 3]));
    assert_eq!(job.num_items_done() + job.num_items_failed(), job.num_items());
    assert_eq!(job.statuses(), vec![JobItemStatus::Completed; 4]);
    assert!(engine.shutdown());
}

#[test]
fn test_parallel_stage_uses_multiple_workers() {
    let engine = JobEngine::new(4).unwrap();
    let rendezvous = Arc::new(Barrier::new(4));
    let items: Vec<Box<dyn JobItem<Ctx>>> = (0..4)
        .map(|i| {
            let rendezvous = Arc::clone(&rendezvous);
            FnItem::new(i, "Rendezvous", move |_, _: &Ctx| {
                rendezvous.wait();
                Ok(())
            })
            .boxed()
        })
        .collect();
    let job = Arc::new(Job::create(items, context(), None).unwrap());

    run_to_completion(&engine, &job);
    assert_eq!(job.num_items_done(), 4);
    assert!(engine.shutdown());
}

#[test]
fn test_runs_alone_items_execute_in_strict_order() {
    let engine = JobEngine::new(4).unwrap();
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[ALONE; 6], SHORT);

    run_to_completion(&engine, &job);

    assert_eq!(trace.completion_order(), vec![0, 1, 2, 3, 4, 5]);
    for i in 0..5 {
        assert!(trace.end(i) < trace.start(i + 1), "item {} overlapped", i + 1);
    }
    assert_eq!(trace.max_running(), 1);
    assert!(engine.shutdown());
}

#[test]
fn test_barrier_separates_groups() {
    let engine = JobEngine::new(4).unwrap();
    let trace = Trace::new();
    let flags = [NONE, NONE, NONE, NONE, ALONE | WAITS, NONE, NONE, NONE, NONE];
    let job = traced_job(&trace, &context(), &flags, SHORT);

    run_to_completion(&engine, &job);

    assert!(trace.strictly_before(&[0, 1, 2, 3], &[4]));
    assert!(trace.strictly_before(&[4], &[5, 6, 7, 8]));
    let order = trace.completion_order();
    let groups: Vec<BTreeSet<usize>> = vec![
        order[0..4].iter().copied().collect(),
        order[4..5].iter().copied().collect(),
        order[5..9].iter().copied().collect(),
    ];
    assert_eq!(groups[0], BTreeSet::from([0, 1, 2, 3]));
    assert_eq!(groups[1], BTreeSet::from([4]));
    assert_eq!(groups[2], BTreeSet::from([5, 6, 7, 8]));
    assert!(engine.shutdown());
}

#[test]
fn test_barrier_item_between_groups() {
    let engine = JobEngine::new(3).unwrap();
    let trace = Trace::new();
    let mut items: Vec<Box<dyn JobItem<Ctx>>> = (0..3)
        .map(|i| traced(&trace, i, NONE, SHORT, Outcome::Succeed))
        .collect();
    items.push(Box::new(BarrierItem::new(3)));
    items.extend((4..7).map(|i| traced(&trace, i, NONE, SHORT, Outcome::Succeed)));
    let job = Arc::new(Job::create(items, context(), Some("Barrier")).unwrap());

    run_to_completion(&engine, &job);

    assert!(trace.strictly_before(&[0, 1, 2], &[4, 5, 6]));
    assert_eq!(job.num_items_done(), 7);
    assert!(engine.shutdown());
}

#[test]
fn test_consecutive_runs_alone_items() {
    let engine = JobEngine::new(4).unwrap();
    let trace = Trace::new();
    let flags = [NONE, NONE, NONE, NONE, ALONE, ALONE, NONE, NONE, NONE];
    let job = traced_job(&trace, &context(), &flags, SHORT);

    run_to_completion(&engine, &job);

    assert!(trace.strictly_before(&[0, 1, 2, 3], &[4]));
    assert!(trace.strictly_before(&[4], &[5]));
    assert!(trace.strictly_before(&[5], &[6, 7, 8]));
    assert_eq!(job.num_items_done(), 9);
    assert!(engine.shutdown());
}

#[test]
fn test_wait_for_worker_termination_is_idempotent() {
    let engine: JobEngine<Ctx> = JobEngine::new(2).unwrap();
    engine.terminate_all();
    assert!(engine.wait_for_worker_termination(TIMEOUT));
    assert!(engine.wait_for_worker_termination(Duration::ZERO));
    assert_eq!(engine.live_workers(), 0);
}

#[test]
fn test_single_item_any_flags_fires_one_terminal_event() {
    let combinations = [
        NONE,
        ALONE,
        WAITS,
        FATAL,
        ALONE | WAITS,
        ALONE | FATAL,
        WAITS | FATAL,
        ALONE | WAITS | FATAL,
    ];
    for flags in combinations {
        for outcome in [Outcome::Succeed, Outcome::Fail] {
            let engine = JobEngine::new(2).unwrap();
            let events = collect_progress(&engine);
            let trace = Trace::new();
            let items = vec![traced(&trace, 0, flags, Duration::ZERO, outcome)];
            let job = Arc::new(Job::create(items, context(), None).unwrap());

            run_to_completion(&engine, &job);

            let events = events.lock();
            let terminal: Vec<_> = events.iter().filter(|e| e.transition.is_terminal()).collect();
            assert_eq!(terminal.len(), 1, "flags {flags}");
            assert_eq!(terminal[0].num_items, 1);
            assert_eq!(terminal[0].num_items_finished(), 1);
            assert!(!terminal[0].is_busy);
            match outcome {
                Outcome::Succeed => assert_eq!(terminal[0].num_items_done, 1),
                _ => assert_eq!(terminal[0].num_items_failed, 1),
            }
            assert!(engine.shutdown());
        }
    }
}

#[test]
fn test_fatal_failure_halts_job() {
    let engine = JobEngine::new(4).unwrap();
    let trace = Trace::new();
    let ctx = context();
    let items = vec![
        traced(&trace, 0, NONE, SHORT, Outcome::Succeed),
        traced(&trace, 1, FATAL, SHORT, Outcome::Fail),
        traced(&trace, 2, NONE, SHORT, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, Arc::clone(&ctx), None).unwrap());

    run_to_completion(&engine, &job);

    assert!(job.is_completed());
    assert!(job.is_fatally_failed());
    assert_eq!(job.num_items_done(), 1);
    assert_eq!(job.num_items_failed(), 1);
    assert_eq!(job.item_status(2), Some(JobItemStatus::Waiting));
    assert!(!trace.ran(2));

    let errors = ctx.log_entries_of(MessageKind::Error);
    assert_eq!(errors[0].item_index, Some(1));
    assert!(errors[0].message.contains("no landmarks"));
    assert_eq!(errors.last().map(|e| e.message.as_str()), Some("The job has FAILED."));
    assert!(engine.shutdown());
}

#[test]
fn test_fatal_exclusive_item_stops_later_stages() {
    let engine = JobEngine::new(2).unwrap();
    let trace = Trace::new();
    let items = vec![
        traced(&trace, 0, NONE, SHORT, Outcome::Succeed),
        traced(&trace, 1, NONE, SHORT, Outcome::Succeed),
        traced(&trace, 2, ALONE | FATAL, SHORT, Outcome::Fail),
        traced(&trace, 3, NONE, SHORT, Outcome::Succeed),
        traced(&trace, 4, NONE, SHORT, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, context(), None).unwrap());

    run_to_completion(&engine, &job);

    assert_eq!(job.num_items_done(), 2);
    assert_eq!(job.num_items_failed(), 1);
    assert_eq!(job.item_status(3), Some(JobItemStatus::Waiting));
    assert_eq!(job.item_status(4), Some(JobItemStatus::Waiting));
    assert!(engine.shutdown());
}

#[test]
fn test_non_fatal_failures_do_not_halt() {
    let engine = JobEngine::new(3).unwrap();
    let trace = Trace::new();
    let items = vec![
        traced(&trace, 0, NONE, SHORT, Outcome::Fail),
        traced(&trace, 1, ALONE, SHORT, Outcome::Fail),
        traced(&trace, 2, NONE, SHORT, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, context(), None).unwrap());

    run_to_completion(&engine, &job);

    assert!(!job.is_fatally_failed());
    assert_eq!(job.num_items_done(), 1);
    assert_eq!(job.num_items_failed(), 2);
    assert!(trace.ran(2));
    assert!(engine.shutdown());
}

#[test]
fn test_panicking_item_fails_without_killing_worker() {
    let engine = JobEngine::new(1).unwrap();
    let trace = Trace::new();
    let ctx = context();
    let items = vec![
        traced(&trace, 0, NONE, Duration::ZERO, Outcome::Panic),
        traced(&trace, 1, NONE, Duration::ZERO, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, Arc::clone(&ctx), None).unwrap());

    run_to_completion(&engine, &job);

    assert_eq!(job.item_status(0), Some(JobItemStatus::Failed));
    assert_eq!(job.item_status(1), Some(JobItemStatus::Completed));
    assert_eq!(engine.live_workers(), 1);
    let errors = ctx.log_entries_of(MessageKind::Error);
    assert!(errors
        .iter()
        .any(|e| e.item_index == Some(0) && e.message.contains("mesh is corrupt")));
    assert!(engine.shutdown());
}

#[test]
fn test_run_while_busy_is_rejected() {
    let engine = JobEngine::new(2).unwrap();
    let trace = Trace::new();
    let gate = Gate::new();
    let first = Arc::new(Job::create(vec![gated(&trace, 0, &gate)], context(), None).unwrap());
    let second = traced_job(&trace, &context(), &[NONE], Duration::ZERO);

    engine.run(Arc::clone(&first)).unwrap();
    assert!(engine.is_busy());
    assert!(matches!(engine.run(Arc::clone(&second)), Err(JobError::EngineBusy)));
    assert!(!second.is_submitted());

    gate.open();
    assert!(engine.wait_until_idle(TIMEOUT));
    run_to_completion(&engine, &second);
    assert!(engine.shutdown());
}

#[test]
fn test_resubmission_is_rejected() {
    let engine = JobEngine::new(2).unwrap();
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE, NONE], Duration::ZERO);

    run_to_completion(&engine, &job);
    assert!(matches!(
        engine.run(Arc::clone(&job)),
        Err(JobError::AlreadySubmitted(_))
    ));
    assert!(engine.shutdown());
}

#[test]
fn test_create_contract_errors() {
    let trace = Trace::new();
    let empty: Vec<Box<dyn JobItem<Ctx>>> = Vec::new();
    assert!(matches!(
        Job::create(empty, context(), None),
        Err(JobError::EmptyJob)
    ));

    let items = vec![
        traced(&trace, 1, NONE, Duration::ZERO, Outcome::Succeed),
        traced(&trace, 0, NONE, Duration::ZERO, Outcome::Succeed),
    ];
    let err = Job::create(items, context(), None).unwrap_err();
    assert!(err.is_misuse());
    assert!(matches!(err, JobError::IndexMismatch { position: 0, index: 1 }));
}

#[test]
fn test_progress_is_monotonic() {
    let engine = JobEngine::new(4).unwrap();
    let events = collect_progress(&engine);
    let trace = Trace::new();
    let items: Vec<Box<dyn JobItem<Ctx>>> = (0..24)
        .map(|i| {
            let flags = if i % 7 == 6 { ALONE } else { NONE };
            let outcome = if i % 5 == 0 { Outcome::Fail } else { Outcome::Succeed };
            traced(&trace, i, flags, Duration::from_millis(1), outcome)
        })
        .collect();
    let job = Arc::new(Job::create(items, context(), Some("Monotonic")).unwrap());

    run_to_completion(&engine, &job);

    let events = events.lock();
    assert_eq!(events.len(), 48);
    for pair in events.windows(2) {
        assert!(pair[1].num_items_done >= pair[0].num_items_done);
        assert!(pair[1].num_items_failed >= pair[0].num_items_failed);
    }
    let starts = events
        .iter()
        .filter(|e| e.transition == ItemTransition::Started)
        .count();
    assert_eq!(starts, 24);

    let last = events.last().unwrap();
    assert!(!last.is_busy);
    assert_eq!(last.num_items_finished(), 24);
    assert_eq!(last.num_items_failed, 5);
    assert_eq!(last.title.as_deref(), Some("Monotonic"));
    assert!(events
        .iter()
        .filter(|e| !e.is_busy)
        .all(|e| e.num_items_finished() == 24));
    assert!(engine.shutdown());
}

#[test]
fn test_terminate_lets_running_item_finish() {
    let engine = JobEngine::new(2).unwrap();
    let trace = Trace::new();
    let gate = Gate::new();
    let items = vec![
        gated(&trace, 0, &gate),
        traced(&trace, 1, ALONE, Duration::ZERO, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, context(), None).unwrap());
    engine.run(Arc::clone(&job)).unwrap();

    while !trace.ran(0) {
        std::thread::sleep(Duration::from_millis(1));
    }
    engine.terminate_all();
    assert!(engine.is_terminating());
    gate.open();

    assert!(engine.wait_for_worker_termination(TIMEOUT));
    assert_eq!(job.item_status(0), Some(JobItemStatus::Completed));
    assert_eq!(job.num_items_done(), 1);
    assert_eq!(job.item_status(1), Some(JobItemStatus::Waiting));
    assert!(!job.is_completed());
    assert!(matches!(
        engine.run(traced_job(&trace, &context(), &[NONE], Duration::ZERO)),
        Err(JobError::EngineTerminated)
    ));
}

#[test]
fn test_listener_can_shut_down_engine() {
    let engine = JobEngine::new(3).unwrap();
    let handle = engine.shutdown_handle();
    engine.subscribe(move |progress| {
        if progress.num_items_finished() == progress.num_items {
            handle.terminate_all();
        }
    });
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE, NONE, ALONE, NONE], SHORT);

    engine.run(Arc::clone(&job)).unwrap();
    assert!(engine.wait_for_worker_termination(TIMEOUT));
    assert!(job.is_completed());
    assert_eq!(job.num_items_done(), 4);
}

#[test]
fn test_panicking_listener_is_isolated() {
    let engine = JobEngine::new(2).unwrap();
    engine.subscribe(|_| panic!("listener bug"));
    let events = collect_progress(&engine);
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE, NONE], Duration::ZERO);

    run_to_completion(&engine, &job);
    assert_eq!(events.lock().len(), 4);
    assert_eq!(engine.live_workers(), 2);
    assert!(engine.shutdown());
}

#[test]
fn test_engine_writes_summary() {
    let engine = JobEngine::new(2).unwrap();
    let trace = Trace::new();
    let ctx = context();
    let items = vec![
        traced(&trace, 0, NONE, Duration::ZERO, Outcome::Succeed),
        traced(&trace, 1, NONE, Duration::ZERO, Outcome::Fail),
        traced(&trace, 2, NONE, Duration::ZERO, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, Arc::clone(&ctx), None).unwrap());

    run_to_completion(&engine, &job);

    let job_level: Vec<String> = ctx
        .log_entries()
        .into_iter()
        .filter(|e| e.item_index.is_none())
        .map(|e| e.message)
        .collect();
    assert_eq!(
        job_level,
        vec![
            "3 job items queued, 2 succeeded, 1 failed.".to_string(),
            "The job has finished successfully.".to_string(),
        ]
    );
    assert!(engine.shutdown());
}

#[test]
fn test_summary_can_be_disabled() {
    let engine = JobEngine::with_config(JobEngineConfig::new(2).with_log_summary(false)).unwrap();
    let trace = Trace::new();
    let ctx = context();
    let job = traced_job(&trace, &ctx, &[NONE, NONE], Duration::ZERO);

    run_to_completion(&engine, &job);
    assert!(ctx.log_entries().is_empty());
    assert!(engine.shutdown());
}

#[test]
fn test_jobs_run_back_to_back() {
    let engine = JobEngine::new(3).unwrap();
    let ctx = context();
    for round in 0..5 {
        let trace = Trace::new();
        let job = traced_job(&trace, &ctx, &[NONE, ALONE, NONE, NONE], Duration::ZERO);
        run_to_completion(&engine, &job);
        assert_eq!(job.num_items_done(), 4, "round {round}");
        assert!(engine.current_job().is_none());
    }
    assert!(engine.shutdown());
}

#[test]
fn test_workers_are_named() {
    let config = JobEngineConfig::new(2).with_thread_name_prefix("gpa");
    let engine = JobEngine::with_config(config).unwrap();
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE, NONE, NONE], Duration::ZERO);

    run_to_completion(&engine, &job);
    let names = trace.thread_names();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n == "gpa-0" || n == "gpa-1"));
    assert!(engine.shutdown());
}

#[test]
fn test_items_share_results_through_workspace() {
    let engine = JobEngine::new(4).unwrap();
    let ctx = context();
    let consistent = Arc::new(AtomicBool::new(false));

    let mut items: Vec<Box<dyn JobItem<Ctx>>> = (0..6)
        .map(|i| {
            FnItem::new(i, "Centroid", move |_, ctx: &Ctx| {
                ctx.workspace().set_indexed("centroid", i, i as f64 * 0.5);
                Ok(())
            })
            .boxed()
        })
        .collect();
    let check = Arc::clone(&consistent);
    items.push(
        FnItem::new(6, "Mean centroid", move |_, ctx: &Ctx| {
            let ws = ctx.workspace();
            let n = ws.indexed_count::<f64>("centroid");
            let sum: f64 = (0..n)
                .filter_map(|i| ws.get_indexed::<f64>("centroid", i))
                .sum();
            check.store(n == 6 && (sum - 7.5).abs() < 1e-9, Ordering::SeqCst);
            Ok(())
        })
        .with_flags(WAITS)
        .boxed(),
    );
    let job = Arc::new(Job::create(items, Arc::clone(&ctx), None).unwrap());

    run_to_completion(&engine, &job);
    assert!(consistent.load(Ordering::SeqCst));
    assert!(engine.shutdown());
}

#[test]
fn test_drop_terminates_workers() {
    let trace = Trace::new();
    let job = traced_job(&trace, &context(), &[NONE, NONE], Duration::ZERO);
    {
        let engine = JobEngine::new(2).unwrap();
        run_to_completion(&engine, &job);
    }
    assert_eq!(job.num_items_done(), 2);
}

/// Context whose log sink always panics.
struct BrokenLog {
    workspace: JobWorkspace,
}

impl JobContext for BrokenLog {
    fn write_log(&self, _: Option<usize>, _: MessageKind, message: &str) {
        panic!("log sink unavailable: {message}");
    }

    fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }
}

#[test]
fn test_panicking_log_sink_keeps_worker_alive() {
    common::init_tracing();
    let engine: JobEngine<BrokenLog> = JobEngine::new(1).unwrap();
    let items: Vec<Box<dyn JobItem<BrokenLog>>> = vec![
        FnItem::new(0, "Import", |_, _: &BrokenLog| {
            Err(JobError::failed("unreadable mesh"))
        })
        .boxed(),
        FnItem::new(1, "Align", |_, _: &BrokenLog| Ok(())).boxed(),
    ];
    let ctx = Arc::new(BrokenLog {
        workspace: JobWorkspace::new(),
    });
    let job = Arc::new(Job::create(items, ctx, Some("Broken log")).unwrap());

    engine.run(Arc::clone(&job)).unwrap();
    assert!(engine.wait_until_idle(TIMEOUT));
    assert!(job.is_completed());
    assert_eq!(
        job.statuses(),
        vec![JobItemStatus::Failed, JobItemStatus::Completed]
    );
    assert_eq!(engine.live_workers(), 1);
    assert!(engine.shutdown());
}

#[test]
fn test_panicking_log_listener_keeps_engine_running() {
    let engine = JobEngine::new(2).unwrap();
    let ctx = context();
    ctx.on_log(|_| panic!("log view disposed"));
    let trace = Trace::new();
    let items = vec![
        traced(&trace, 0, NONE, Duration::ZERO, Outcome::Fail),
        traced(&trace, 1, NONE, Duration::ZERO, Outcome::Succeed),
    ];
    let job = Arc::new(Job::create(items, Arc::clone(&ctx), None).unwrap());

    run_to_completion(&engine, &job);
    assert_eq!(job.num_items_failed(), 1);
    assert_eq!(job.num_items_done(), 1);
    assert_eq!(ctx.log_entries_of(MessageKind::Error).len(), 1);
    assert_eq!(engine.live_workers(), 2);
    assert!(engine.shutdown());
}
