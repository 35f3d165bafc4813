use longpoll::queue::{Script, ScriptQueue};
use longpoll::time::{ManualClock, Scheduler, TimerHandle};
use longpoll::{
    Framing, PendingPoll, PollConfig, PollCoordinator, PollError, PollOutcome, Resumption,
    SignalKind, TimerReactor, WakeHandle, WakeReason, WriteError,
};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config(max_wait: u64, grace: u64) -> PollConfig {
    PollConfig::builder()
        .max_wait(ms(max_wait))
        .grace_period(ms(grace))
        .build()
}

fn virtual_setup(max_wait: u64, grace: u64) -> (Arc<ManualClock>, Arc<ScriptQueue>, PollCoordinator) {
    let clock = Arc::new(ManualClock::new());
    let queue = Arc::new(ScriptQueue::new());
    let coordinator = PollCoordinator::new(config(max_wait, grace), clock.clone());

    (clock, queue, coordinator)
}

/// Collects what the framing layer would have written.
struct Collect {
    queue: Arc<ScriptQueue>,
    flushes: Vec<(PollOutcome, Vec<Script>)>,
}

impl Collect {
    fn new(queue: &Arc<ScriptQueue>) -> Self {
        Self {
            queue: queue.clone(),
            flushes: Vec::new(),
        }
    }
}

impl Framing for Collect {
    fn flush(&mut self, outcome: &PollOutcome) -> Result<(), WriteError> {
        self.flushes.push((*outcome, self.queue.drain()));
        Ok(())
    }
}

struct BrokenPipe;

impl Framing for BrokenPipe {
    fn flush(&mut self, _outcome: &PollOutcome) -> Result<(), WriteError> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away").into())
    }
}

/// Schedules one script per listed instant on the clock, then steps
/// virtual time a millisecond at a time and returns the millisecond the
/// waiter woke at.
///
/// Producers are scheduled before any grace timer, so a script due at the
/// same instant as a grace timer runs first and resets it.
fn drive(
    clock: &Arc<ManualClock>,
    queue: &Arc<ScriptQueue>,
    handle: &WakeHandle,
    scripts_at: &[u64],
    limit: u64,
) -> Option<u64> {
    let producers: Vec<TimerHandle> = scripts_at
        .iter()
        .map(|&t| {
            let queue = queue.clone();
            clock
                .schedule(
                    ms(t),
                    Box::new(move || {
                        queue.enqueue(format!("script@{t}"));
                    }),
                )
                .unwrap()
        })
        .collect();

    let mut woke = None;
    for t in 0..=limit {
        clock.advance_to(ms(t));
        if handle.woken_by().is_some() {
            woke = Some(t);
            break;
        }
    }

    for producer in &producers {
        producer.cancel();
    }

    woke
}

fn finish(poll: PendingPoll, queue: &Arc<ScriptQueue>) -> (PollOutcome, Vec<Script>) {
    let mut framing = Collect::new(queue);
    let outcome = poll.wait(&mut framing).unwrap();

    framing.flushes.pop().unwrap_or((outcome, Vec::new()))
}

#[test]
fn test_single_script_released_after_grace() {
    let (clock, queue, coordinator) = virtual_setup(500, 50);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let id = poll.waiter_id();

    assert_eq!(handle.id(), id);
    assert_eq!(poll.armed(), vec![SignalKind::Deadline, SignalKind::ActivityGrace]);

    let woke = drive(&clock, &queue, &handle, &[10], 600);
    assert_eq!(woke, Some(60));
    assert_eq!(handle.woken_by(), Some(WakeReason::Activity));

    let (outcome, scripts) = finish(poll, &queue);
    assert_eq!(outcome.waiter, id);
    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Activity));
    assert_eq!(scripts, vec![Script::from("script@10")]);

    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0, "deadline timer must be cancelled too");
}

#[test]
fn test_burst_is_coalesced_into_one_flush() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let woke = drive(&clock, &queue, &handle, &[0, 25, 55], 300);
    assert_eq!(woke, Some(85));

    let (outcome, scripts) = finish(poll, &queue);
    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Activity));
    assert_eq!(scripts.len(), 3);
    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_deadline_caps_endless_activity() {
    let (clock, queue, coordinator) = virtual_setup(100, 50);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let scripts_at: Vec<u64> = (0..10).map(|n| n * 40).collect();
    let woke = drive(&clock, &queue, &handle, &scripts_at, 400);
    assert_eq!(woke, Some(100));
    assert_eq!(handle.woken_by(), Some(WakeReason::Deadline));

    let (_, scripts) = finish(poll, &queue);
    assert_eq!(scripts.len(), 3, "scripts at 0, 40 and 80 are flushed");
    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_grace_longer_than_deadline_lets_deadline_win() {
    let (clock, queue, coordinator) = virtual_setup(50, 80);
    assert_eq!(coordinator.config().max_wait(), ms(50));
    assert_eq!(coordinator.config().grace_period(), ms(80));

    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let woke = drive(&clock, &queue, &handle, &[10], 200);
    assert_eq!(woke, Some(50));

    let (outcome, scripts) = finish(poll, &queue);
    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Deadline));
    assert_eq!(scripts, vec![Script::from("script@10")]);
    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0, "pending grace timer must be cancelled");
}

#[test]
fn test_quiet_poll_resumes_at_deadline() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let woke = drive(&clock, &queue, &handle, &[], 300);
    assert_eq!(woke, Some(200));

    let (outcome, scripts) = finish(poll, &queue);
    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Deadline));
    assert!(scripts.is_empty(), "an empty flush is expected");
    assert_eq!(queue.subscriber_count(), 0);
}

#[test]
fn test_pending_output_skips_blocking() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    queue.enqueue("early");

    let mut framing = Collect::new(&queue);
    let outcome = coordinator.poll(Some(queue.clone()), &mut framing).unwrap();

    assert_eq!(outcome.reason, Resumption::OutputPending);
    assert!(!outcome.blocked);
    assert_eq!(framing.flushes[0].1, vec![Script::from("early")]);
    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_cancelled_poll_leaves_nothing_behind() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    queue.enqueue("a");
    assert_eq!(queue.subscriber_count(), 1);
    assert_eq!(clock.pending(), 2);

    poll.cancel();

    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
    clock.advance(ms(1000));
    assert_eq!(handle.woken_by(), None, "waiter is gone with the poll");
}

#[test]
fn test_dropped_poll_tears_down() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    let poll = coordinator.begin(Some(queue.clone()));
    drop(poll);

    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_external_wake_resumes_and_tears_down() {
    let (clock, queue, coordinator) = virtual_setup(200, 30);
    let poll = coordinator.begin(Some(queue.clone()));
    let handle = poll.wake_handle();

    let interrupter = thread::spawn(move || {
        thread::sleep(ms(20));
        handle.wake(WakeReason::External)
    });

    let mut framing = Collect::new(&queue);
    let outcome = poll.wait(&mut framing).unwrap();

    assert!(interrupter.join().unwrap());
    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::External));
    assert!(outcome.blocked);
    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_without_queue_only_deadline_is_armed() {
    let (clock, _queue, coordinator) = virtual_setup(100, 30);
    let poll = coordinator.begin(None);
    let handle = poll.wake_handle();

    assert_eq!(poll.armed(), vec![SignalKind::Deadline]);

    clock.advance(ms(100));
    assert_eq!(handle.woken_by(), Some(WakeReason::Deadline));
    poll.cancel();
    assert_eq!(clock.pending(), 0);
}

#[test]
fn test_closed_session_falls_back_to_deadline() {
    let (clock, queue, coordinator) = virtual_setup(100, 30);
    queue.close();

    let poll = coordinator.begin(Some(queue.clone()));
    assert_eq!(poll.armed(), vec![SignalKind::Deadline]);

    let handle = poll.wake_handle();
    clock.advance(ms(100));
    assert_eq!(handle.woken_by(), Some(WakeReason::Deadline));
}

#[test]
fn test_timer_failure_falls_back_to_ceiling() {
    let queue = Arc::new(ScriptQueue::new());
    let clock = Arc::new(ManualClock::new());
    clock.fail_scheduling(true);

    let coordinator = PollCoordinator::new(config(40, 10), clock.clone());
    let mut framing = Collect::new(&queue);

    let start = Instant::now();
    let outcome = coordinator.poll(Some(queue.clone()), &mut framing).unwrap();

    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Ceiling));
    assert!(start.elapsed() >= ms(40));
    assert_eq!(queue.subscriber_count(), 0);
}

#[test]
fn test_write_failure_is_fatal_for_request_only() {
    let (clock, queue, coordinator) = virtual_setup(100, 30);
    queue.enqueue("x");

    let result = coordinator.poll(Some(queue.clone()), &mut BrokenPipe);
    match result {
        Err(PollError::Write(err)) => assert_eq!(err.io().kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected a write error, got {other:?}"),
    }

    assert_eq!(queue.subscriber_count(), 0);
    assert_eq!(clock.pending(), 0);

    let mut framing = Collect::new(&queue);
    let outcome = coordinator.poll(Some(queue.clone()), &mut framing).unwrap();
    assert_eq!(outcome.reason, Resumption::OutputPending);
}

#[test]
fn test_wall_clock_deadline_lower_bound() {
    let reactor = TimerReactor::start().unwrap();
    let coordinator = PollCoordinator::new(config(60, 20), Arc::new(reactor.handle()));
    let queue = Arc::new(ScriptQueue::new());
    let mut framing = Collect::new(&queue);

    let start = Instant::now();
    let outcome = coordinator.poll(Some(queue.clone()), &mut framing).unwrap();

    assert!(start.elapsed() >= ms(60), "poll must not resume before its deadline");
    assert!(matches!(
        outcome.reason,
        Resumption::Woken(WakeReason::Deadline | WakeReason::Ceiling)
    ));
    assert_eq!(queue.subscriber_count(), 0);
}

#[test]
fn test_wall_clock_activity_releases_early() {
    let reactor = TimerReactor::start().unwrap();
    let coordinator = PollCoordinator::new(config(2_000, 30), Arc::new(reactor.handle()));
    let queue = Arc::new(ScriptQueue::new());
    let start = Instant::now();

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            thread::sleep(ms(20));
            queue.enqueue("a");
            thread::sleep(ms(5));
            queue.enqueue("b");
        })
    };

    let mut framing = Collect::new(&queue);
    let outcome = coordinator.poll(Some(queue.clone()), &mut framing).unwrap();
    let elapsed = start.elapsed();

    producer.join().unwrap();

    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Activity));
    assert!(elapsed >= ms(55), "grace window follows the last script");
    assert!(elapsed < ms(1_500), "activity must release well before the deadline");
    assert_eq!(framing.flushes[0].1.len(), 2);
    assert_eq!(queue.subscriber_count(), 0);
}

#[test]
fn test_concurrent_polls_are_independent() {
    let reactor = TimerReactor::start().unwrap();
    let coordinator = Arc::new(PollCoordinator::new(
        config(1_000, 20),
        Arc::new(reactor.handle()),
    ));

    let queues: Vec<Arc<ScriptQueue>> = (0..4).map(|_| Arc::new(ScriptQueue::new())).collect();

    let polls: Vec<_> = queues
        .iter()
        .map(|queue| {
            let coordinator = coordinator.clone();
            let queue = queue.clone();
            thread::spawn(move || {
                let mut framing = Collect::new(&queue);
                coordinator.poll(Some(queue.clone()), &mut framing).unwrap()
            })
        })
        .collect();

    thread::sleep(ms(30));
    for (i, queue) in queues.iter().enumerate() {
        queue.enqueue(format!("for-{i}"));
    }

    for poll in polls {
        let outcome = poll.join().unwrap();
        assert!(matches!(
            outcome.reason,
            Resumption::Woken(WakeReason::Activity) | Resumption::OutputPending
        ));
    }

    for queue in &queues {
        assert_eq!(queue.subscriber_count(), 0);
        assert!(queue.drain().is_empty(), "each poll flushed its own session");
    }
}

#[test]
fn test_unrepresentable_max_wait_falls_back_to_activity() {
    let reactor = TimerReactor::start().unwrap();
    let config = PollConfig::builder()
        .max_wait(Duration::MAX)
        .grace_period(ms(20))
        .build();
    let coordinator = PollCoordinator::new(config, Arc::new(reactor.handle()));
    let queue = Arc::new(ScriptQueue::new());

    let poll = coordinator.begin(Some(queue.clone()));
    assert_eq!(
        poll.armed(),
        vec![SignalKind::ActivityGrace],
        "a deadline that cannot be represented is not armed"
    );

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            thread::sleep(ms(20));
            queue.enqueue("late");
        })
    };

    let mut framing = Collect::new(&queue);
    let outcome = poll.wait(&mut framing).unwrap();
    producer.join().unwrap();

    assert_eq!(outcome.reason, Resumption::Woken(WakeReason::Activity));
    assert_eq!(framing.flushes[0].1, vec![Script::from("late")]);
    assert_eq!(queue.subscriber_count(), 0);
}
