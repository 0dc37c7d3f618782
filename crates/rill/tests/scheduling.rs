//! Scheduling behavior: suspension bounds, cooperative yielding, the
//! blocking pool handoff, and worker pinning.

use rill::{Config, Runtime, Term};
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn recv<T: Term>() -> T {
    let bytes = rill::receive(None).await.expect("receive without timeout");
    T::decode(&bytes).expect("undecodable message")
}

#[test]
fn suspend_waits_at_least_the_requested_duration() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            for duration in [
                Duration::ZERO,
                Duration::from_micros(1),
                Duration::from_millis(10),
            ] {
                let start = Instant::now();
                rill::suspend(Some(duration)).await;
                // Never early; lateness is bounded only by scheduling.
                assert!(
                    start.elapsed() >= duration,
                    "woke {:?} early",
                    duration - start.elapsed()
                );
            }
        })
        .unwrap();
}

#[test]
fn bare_suspend_yields_and_resumes() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let mut progress = 0u32;
            for _ in 0..100 {
                rill::suspend(None).await;
                progress += 1;
            }
            assert_eq!(progress, 100);
        })
        .unwrap();
}

#[test]
fn blocking_returns_the_closure_result() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let x = rill::blocking(|| 10).await;
            assert_eq!(x, 10);

            // The closure really runs off the scheduler workers.
            let name = rill::blocking(|| {
                std::thread::current().name().map(str::to_string)
            })
            .await;
            assert_eq!(name.as_deref(), Some("rill-blocking"));
        })
        .unwrap();
}

#[test]
fn blocking_frees_the_worker_for_other_processes() {
    init_tracing();
    // One worker: if the blocking call held it, nothing else could run.
    let runtime = Runtime::with_config(Config {
        workers: 1,
        ..Config::default()
    })
    .unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            let (release_tx, release_rx) = mpsc::channel::<()>();

            rill::spawn(move || async move {
                let released = rill::blocking(move || release_rx.recv().is_ok()).await;
                assert!(released);
                rill::send(parent, &"a".to_string());
            });
            rill::spawn(move || async move {
                rill::send(parent, &"b".to_string());
            });

            // B runs to completion while A sits in its blocking call.
            assert_eq!(recv::<String>().await, "b");
            release_tx.send(()).unwrap();
            assert_eq!(recv::<String>().await, "a");
        })
        .unwrap();
}

#[test]
fn blocking_panic_unwinds_the_owning_process() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            rill::spawn(move || async move {
                rill::panicking(move |msg| rill::send(parent, &msg));
                rill::blocking(|| panic!("job failed")).await;
            });
            assert_eq!(recv::<String>().await, "job failed");
        })
        .unwrap();
}

#[test]
fn pinned_block_sticks_to_one_thread() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let value = rill::pinned(async {
                let thread = std::thread::current().id();
                for _ in 0..10 {
                    rill::suspend(None).await;
                    assert_eq!(std::thread::current().id(), thread);
                }
                10
            })
            .await;
            assert_eq!(value, 10);
        })
        .unwrap();
}

#[test]
fn nested_pinned_blocks_restore_the_outer_pin() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            rill::pinned(async {
                let thread = std::thread::current().id();
                rill::pinned(async {
                    rill::suspend(None).await;
                    assert_eq!(std::thread::current().id(), thread);
                })
                .await;
                // Back in the outer block, still pinned to the same worker.
                rill::suspend(None).await;
                assert_eq!(std::thread::current().id(), thread);
            })
            .await;
        })
        .unwrap();
}

#[test]
fn pinned_block_survives_a_timed_suspend() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            rill::pinned(async {
                let thread = std::thread::current().id();
                rill::suspend(Some(Duration::from_millis(2))).await;
                assert_eq!(std::thread::current().id(), thread);
            })
            .await;
        })
        .unwrap();
}

#[test]
fn many_processes_share_a_single_worker() {
    init_tracing();
    let runtime = Runtime::with_config(Config {
        workers: 1,
        ..Config::default()
    })
    .unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            for i in 0..100u64 {
                rill::spawn(move || async move {
                    rill::suspend(Some(Duration::from_millis(1))).await;
                    rill::send(parent, &i);
                });
            }
            let mut seen = Vec::new();
            for _ in 0..100 {
                seen.push(recv::<u64>().await);
            }
            seen.sort_unstable();
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        })
        .unwrap();
}

#[test]
fn process_count_tracks_live_processes() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    let (tx, rx) = mpsc::channel::<()>();
    let pid = runtime.spawn(move || async move {
        let _ = rill::receive(None).await;
        drop(tx);
    });
    assert!(runtime.process_count() >= 1);

    runtime.handle().send(pid, &0u64).unwrap();
    // The channel closes when the process finishes.
    assert!(rx.recv().is_err());

    let start = Instant::now();
    while runtime.process_count() > 0 {
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(1));
    }
}
