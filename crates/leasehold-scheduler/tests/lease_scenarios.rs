//! End-to-end lease scenarios with two instances sharing one store.
//!
//! Time is paused, so every timestamp below is exact tokio time measured
//! from the start of the test.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use leasehold_lock::{
    DistributedLock, HolderId, LeaseStore, LockError, LockIdentity, MemoryLeaseStore,
};
use leasehold_scheduler::{
    FnTask, ScheduledWorker, Task, TaskError, TickOutcome, WorkerConfig, WorkerGroup,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, advance, sleep};

const DEADLINE: Duration = Duration::from_secs(3);

fn lock(store: &Arc<dyn LeaseStore>, holder: &str, ttl: Duration) -> DistributedLock {
    DistributedLock::new(
        Arc::clone(store),
        LockIdentity::new("sync-job", HolderId::new(holder)),
        ttl,
    )
}

/// Record of one task run: (instance, start, end), offsets from test start.
type RunLog = Arc<Mutex<Vec<(String, Duration, Duration)>>>;

/// A task that sleeps for `durations[n]` on its n-th run and returns
/// without yielding once `durations` is exhausted.
fn recording_task(
    instance: &str,
    durations: Vec<Duration>,
    origin: Instant,
    log: &RunLog,
) -> Arc<dyn Task> {
    let instance = instance.to_string();
    let log = Arc::clone(log);
    let durations = Arc::new(durations);
    let count = Arc::new(Mutex::new(0usize));
    Arc::new(FnTask::new(move |_shutdown: watch::Receiver<bool>| {
        let instance = instance.clone();
        let log = Arc::clone(&log);
        let durations = Arc::clone(&durations);
        let count = Arc::clone(&count);
        async move {
            let n = {
                let mut count = count.lock().unwrap();
                *count += 1;
                *count - 1
            };
            let start = origin.elapsed();
            if let Some(duration) = durations.get(n) {
                sleep(*duration).await;
            }
            log.lock().unwrap().push((instance, start, origin.elapsed()));
            Ok::<(), TaskError>(())
        }
    }))
}

fn worker_config(holder: &str, tick: Duration, ttl: Duration) -> WorkerConfig {
    WorkerConfig {
        name: format!("sync-{holder}"),
        enabled: true,
        lock_key: "sync-job".to_string(),
        holder_id: Some(holder.to_string()),
        tick_interval: tick,
        lease_ttl: ttl,
        acquire_timeout: DEADLINE,
    }
}

fn build_worker(
    store: &Arc<dyn LeaseStore>,
    config: WorkerConfig,
    task: Arc<dyn Task>,
) -> ScheduledWorker {
    let descriptor = config
        .into_descriptor(|| panic!("holder ids are explicit in tests"))
        .unwrap();
    ScheduledWorker::new(descriptor, Arc::clone(store), task)
}

fn assert_no_overlap(runs: &[(String, Duration, Duration)]) {
    let mut sorted = runs.to_vec();
    sorted.sort_by_key(|(_, start, _)| *start);
    for pair in sorted.windows(2) {
        let (a, _, a_end) = &pair[0];
        let (b, b_start, _) = &pair[1];
        assert!(
            a_end <= b_start,
            "runs overlap: {a} until {a_end:?}, {b} from {b_start:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn second_instance_waits_for_release() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let a = lock(&store, "instance-a", Duration::from_secs(5));
    let b = lock(&store, "instance-b", Duration::from_secs(5));

    // t=0: A wins, B's concurrent attempt loses
    assert!(a.acquire(DEADLINE).await.unwrap());
    assert!(!b.acquire(DEADLINE).await.unwrap());

    // t=1: A still running
    advance(Duration::from_secs(1)).await;
    assert!(!b.acquire(DEADLINE).await.unwrap());

    // t=2: A finishes and releases
    advance(Duration::from_secs(1)).await;
    a.release(DEADLINE).await.unwrap();

    // t=3: B gets it
    advance(Duration::from_secs(1)).await;
    assert!(b.acquire(DEADLINE).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn stuck_holder_is_recovered_by_ttl() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let a = lock(&store, "instance-a", Duration::from_secs(2));
    let b = lock(&store, "instance-b", Duration::from_secs(2));

    assert!(a.acquire(DEADLINE).await.unwrap());
    assert!(!b.acquire(DEADLINE).await.unwrap());

    // A hangs and never releases; the lease expires at t=2
    advance(Duration::from_millis(2100)).await;
    assert!(b.acquire(DEADLINE).await.unwrap());

    // A wakes at t=10, after B's lease expired as well
    advance(Duration::from_millis(7900)).await;
    let err = a.release(DEADLINE).await.unwrap_err();
    assert!(matches!(err, LockError::NotHeld { .. }));
}

#[tokio::test(start_paused = true)]
async fn stale_release_does_not_touch_new_holder() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let a = lock(&store, "instance-a", Duration::from_secs(2));
    let b = lock(&store, "instance-b", Duration::from_secs(60));

    assert!(a.acquire(DEADLINE).await.unwrap());
    advance(Duration::from_secs(3)).await;
    assert!(b.acquire(DEADLINE).await.unwrap());

    let err = a.release(DEADLINE).await.unwrap_err();
    assert!(err.to_string().contains("wrong lease owner"));
    assert_eq!(
        store.get("sync-job").await.unwrap().as_deref(),
        Some("instance-b")
    );
}

#[tokio::test(start_paused = true)]
async fn two_workers_take_turns() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let origin = Instant::now();
    let log: RunLog = Arc::default();
    let tick = Duration::from_secs(1);
    let ttl = Duration::from_secs(5);

    // A's first run takes 2s, every later run of either worker is instant
    let group = WorkerGroup::new()
        .with_worker(build_worker(
            &store,
            worker_config("instance-a", tick, ttl),
            recording_task("instance-a", vec![Duration::from_secs(2)], origin, &log),
        ))
        .with_worker(build_worker(
            &store,
            worker_config("instance-b", tick, ttl),
            recording_task("instance-b", vec![], origin, &log),
        ));

    let (tx, rx) = watch::channel(false);
    let handles = group.start(rx);
    sleep(Duration::from_millis(4500)).await;
    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let runs = log.lock().unwrap().clone();
    assert_no_overlap(&runs);

    let (first, start, end) = &runs[0];
    assert_eq!(first, "instance-a");
    assert_eq!(*start, Duration::ZERO);
    assert!(*end >= Duration::from_secs(2));

    // B never ran while A held the lease, and got a turn by t=3
    let b_first = runs
        .iter()
        .find(|(instance, _, _)| instance == "instance-b")
        .map(|(_, start, _)| *start)
        .expect("instance-b never ran");
    assert!(b_first >= Duration::from_secs(2));
    assert!(b_first <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn hung_worker_loses_lease_to_peer() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let origin = Instant::now();
    let log: RunLog = Arc::default();
    let ttl = Duration::from_secs(2);
    let (reporter, mut reports) = mpsc::unbounded_channel();

    let a = build_worker(
        &store,
        worker_config("instance-a", Duration::from_secs(60), ttl),
        recording_task("instance-a", vec![Duration::from_secs(10)], origin, &log),
    )
    .with_reporter(reporter.clone());
    let b = build_worker(
        &store,
        worker_config("instance-b", Duration::from_millis(100), ttl),
        recording_task("instance-b", vec![], origin, &log),
    )
    .with_reporter(reporter);

    let (tx, rx) = watch::channel(false);
    let handles = WorkerGroup::new().with_worker(a).with_worker(b).start(rx);
    sleep(Duration::from_millis(10500)).await;
    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let runs = log.lock().unwrap().clone();
    let b_first = runs
        .iter()
        .find(|(instance, _, _)| instance == "instance-b")
        .map(|(_, start, _)| *start)
        .expect("instance-b never ran");
    // The lease expired at t=2 even though A never released it
    assert!(b_first >= Duration::from_secs(2));
    assert!(b_first <= Duration::from_millis(2100));

    // A's late release found the lease gone or owned by B, and shrugged
    let mut a_release = None;
    while let Ok((name, outcome)) = reports.try_recv() {
        if name != "sync-instance-a" {
            continue;
        }
        if let TickOutcome::Ran { result, release } = outcome {
            assert!(result.is_ok());
            a_release = Some(release);
        }
    }
    let err = a_release
        .expect("instance-a ran once")
        .expect_err("lease was lost");
    assert!(err.is_lost_lease());
}

#[tokio::test(start_paused = true)]
async fn disabled_instance_leaves_the_lease_to_its_peer() {
    let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let origin = Instant::now();
    let log: RunLog = Arc::default();
    let tick = Duration::from_secs(1);
    let (reporter, mut reports) = mpsc::unbounded_channel();

    let mut disabled = worker_config("instance-a", tick, Duration::from_secs(5));
    disabled.enabled = false;

    let (tx, rx) = watch::channel(false);
    let handles = WorkerGroup::new()
        .with_worker(
            build_worker(
                &store,
                disabled,
                recording_task("instance-a", vec![], origin, &log),
            )
            .with_reporter(reporter.clone()),
        )
        .with_worker(
            build_worker(
                &store,
                worker_config("instance-b", tick, Duration::from_secs(5)),
                recording_task("instance-b", vec![], origin, &log),
            )
            .with_reporter(reporter),
        )
        .start(rx);
    sleep(Duration::from_millis(2500)).await;
    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let runs = log.lock().unwrap().clone();
    assert!(runs.iter().all(|(instance, _, _)| instance == "instance-b"));
    assert_eq!(runs.len(), 3);

    let mut disabled_ticks = 0;
    while let Ok((name, outcome)) = reports.try_recv() {
        if name == "sync-instance-a" {
            assert!(matches!(outcome, TickOutcome::Disabled));
            disabled_ticks += 1;
        }
    }
    assert_eq!(disabled_ticks, 3);
}
