//! Process exit protocols: terminate, panic, deferred cleanup, panic
//! handlers, and failure isolation.

use rill::{ExitReason, Runtime, Term};
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn recv<T: Term>() -> T {
    let bytes = rill::receive(None).await.expect("receive without timeout");
    T::decode(&bytes).expect("undecodable message")
}

fn send_str(pid: rill::Pid, s: &str) {
    rill::send(pid, &s.to_string());
}

#[test]
fn terminate_runs_defers_and_stops_the_stream() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            let child = rill::spawn(move || async move {
                rill::defer(move || send_str(parent, "cleanup"));
                let stop: u64 = recv().await;
                if stop == 1 {
                    rill::terminate();
                }
                send_str(parent, "after");
            });
            rill::send(child, &1u64);

            assert_eq!(recv::<String>().await, "cleanup");
            // Nothing past terminate() ever executes.
            assert!(rill::receive(Some(Duration::from_millis(10))).await.is_none());
        })
        .unwrap();
}

#[test]
fn panic_runs_defers_lifo_then_the_handler() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            rill::spawn(move || async move {
                rill::panicking(move |msg| rill::send(parent, &format!("handler:{msg}")));
                rill::defer(move || send_str(parent, "d1"));
                rill::defer(move || send_str(parent, "d2"));
                rill::panic("example panic");
            });

            assert_eq!(recv::<String>().await, "d2");
            assert_eq!(recv::<String>().await, "d1");
            assert_eq!(recv::<String>().await, "handler:example panic");
        })
        .unwrap();
}

#[test]
fn native_panics_follow_the_same_protocol() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            rill::spawn(move || async move {
                rill::panicking(move |msg| rill::send(parent, &msg));
                panic!("native failure");
            });
            assert_eq!(recv::<String>().await, "native failure");
        })
        .unwrap();
}

#[test]
fn a_panicking_process_never_disturbs_its_neighbors() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            // No handler: the panic is reported and absorbed.
            rill::spawn(|| async {
                rill::panic("going down alone");
            });
            rill::spawn(move || async move {
                rill::suspend(Some(Duration::from_millis(5))).await;
                send_str(parent, "b-ok");
            });
            assert_eq!(recv::<String>().await, "b-ok");

            // The runtime keeps scheduling new work afterwards.
            rill::spawn(move || async move { send_str(parent, "c-ok") });
            assert_eq!(recv::<String>().await, "c-ok");
        })
        .unwrap();
}

#[test]
fn scoped_defers_run_at_scope_exit() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            rill::spawn(move || async move {
                send_str(parent, "enter");
                rill::scoped(async move {
                    rill::defer(move || send_str(parent, "deferred"));
                    send_str(parent, "inside");
                })
                .await;
                send_str(parent, "after");
            });

            for expected in ["enter", "inside", "deferred", "after"] {
                assert_eq!(recv::<String>().await, expected);
            }
        })
        .unwrap();
}

#[test]
fn unwind_drains_scopes_innermost_first() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    runtime
        .run(|| async {
            let parent = rill::current();
            let child = rill::spawn(move || async move {
                rill::defer(move || send_str(parent, "root"));
                rill::scoped(async move {
                    rill::defer(move || send_str(parent, "inner"));
                    let go: u64 = recv().await;
                    if go == 1 {
                        rill::terminate();
                    }
                })
                .await;
            });

            // The child parks inside its inner scope; release it.
            rill::send(child, &1u64);
            assert_eq!(recv::<String>().await, "inner");
            assert_eq!(recv::<String>().await, "root");
        })
        .unwrap();
}

#[test]
fn exit_reason_is_observable_through_a_held_handle() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    let pid = runtime.spawn(|| async {
        let _ = rill::receive(None).await;
        rill::panic("oops");
    });

    // The child parks on its receive, so the lookup cannot race its death.
    let handle = runtime
        .handle()
        .lookup(pid)
        .expect("child should be alive and parked");
    runtime.handle().send(pid, &0u64).unwrap();

    let start = Instant::now();
    while handle.is_alive() {
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(handle.status(), rill::ProcessStatus::Terminated);
    assert_eq!(
        handle.exit_reason(),
        Some(ExitReason::Panic("oops".to_string()))
    );
    // The table forgets terminated processes.
    assert!(runtime.handle().lookup(pid).is_none());
}

#[test]
fn root_panic_surfaces_to_the_embedder() {
    init_tracing();
    let runtime = Runtime::new().unwrap();
    let result = runtime.run(|| async {
        rill::panic("root failure");
    });
    match result {
        Err(rill::RuntimeError::RootPanic(msg)) => assert_eq!(msg, "root failure"),
        other => panic!("expected a root panic error, got {:?}", other.map(|_| ())),
    }
}
