use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, ThreadId},
    time::Duration,
};

use futures::{
    StreamExt,
    channel::{mpsc, oneshot},
    task::{FutureObj, Spawn, SpawnError},
};
use taskflow::{Dispatcher, FnSpawner, Level, MainContext, TaskError, TaskExt, TryTaskExt};

type Fault = TaskError<String>;

fn fault(message: &str) -> Fault {
    TaskError::Faulted(message.to_string())
}

// A sink that forwards every line over a channel so tests can await it.
fn channel_sink() -> (
    mpsc::UnboundedReceiver<(Level, String)>,
    impl Fn(Level, &str) + Send + Sync + 'static,
) {
    let (sender, receiver) = mpsc::unbounded();
    let sink = move |level: Level, message: &str| {
        let _ = sender.unbounded_send((level, message.to_string()));
    };
    (receiver, sink)
}

#[tokio::test]
async fn forget_then_delivers_value() {
    let (main, _main_loop) = MainContext::new();
    let dispatcher = Dispatcher::thread_pool(2, main).unwrap();
    let (sender, receiver) = oneshot::channel();

    async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, Fault>("done")
    }
    .forget_then(&dispatcher, move |v| {
        let _ = sender.send(v);
    });

    assert_eq!(receiver.await, Ok("done"), "Completion callback should run");
}

#[tokio::test]
async fn forget_with_success_skips_error_handler() {
    let (main, main_loop) = MainContext::new();
    let dispatcher = Dispatcher::thread_pool(2, main).unwrap();
    let completed = Arc::new(AtomicU8::new(0));
    let failed = Arc::new(AtomicU8::new(0));
    let completed_cl = Arc::clone(&completed);
    let failed_cl = Arc::clone(&failed);

    async { Ok::<_, Fault>(3u8) }.forget_with(
        &dispatcher,
        move |v| {
            completed_cl.fetch_add(v, Ordering::Relaxed);
        },
        move |_| {
            failed_cl.fetch_add(1, Ordering::Relaxed);
        },
        true,
    );
    drop(dispatcher);
    // Resolves once the detached task dropped its dispatcher clone.
    main_loop.run().await;

    assert_eq!(completed.load(Ordering::Relaxed), 3, "onComplete should run once");
    assert_eq!(failed.load(Ordering::Relaxed), 0, "onError should not run");
}

#[tokio::test]
async fn error_handler_runs_on_main_context() {
    let (main, main_loop) = MainContext::new();
    let dispatcher = Dispatcher::thread_pool(2, main).unwrap();
    let handled_on: Arc<Mutex<Vec<(ThreadId, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let handled_cl = Arc::clone(&handled_on);
    let completed = Arc::new(AtomicU8::new(0));
    let completed_cl = Arc::clone(&completed);

    async { Err::<(), _>(fault("boom")) }.forget_with(
        &dispatcher,
        move |_| {
            completed_cl.fetch_add(1, Ordering::Relaxed);
        },
        move |e| handled_cl.lock().unwrap().push((thread::current().id(), e)),
        true,
    );
    drop(dispatcher);
    main_loop.run().await;

    let handled_on = handled_on.lock().unwrap();
    assert_eq!(handled_on.len(), 1, "onError should run exactly once");
    assert_eq!(
        handled_on[0],
        (thread::current().id(), "boom".to_string()),
        "onError should run on the thread draining the main loop"
    );
    assert_eq!(completed.load(Ordering::Relaxed), 0, "onComplete should not run");
}

#[tokio::test]
async fn error_handler_can_stay_on_background() {
    let (main, mut main_loop) = MainContext::new();
    let dispatcher = Dispatcher::thread_pool(1, main).unwrap();
    let (sender, receiver) = oneshot::channel();

    async { Err::<(), _>(fault("late")) }.forget_with(
        &dispatcher,
        |_| {},
        move |e| {
            let name = thread::current().name().map(str::to_string);
            let _ = sender.send((name, e));
        },
        false,
    );

    let (name, e) = receiver.await.unwrap();
    assert_eq!(e, "late");
    assert!(
        name.is_some_and(|n| n.starts_with("taskflow-worker-")),
        "onError should run on the worker that observed the fault"
    );
    assert_eq!(main_loop.run_pending(), 0, "Nothing should be queued on main");
}

#[tokio::test]
async fn unhandled_fault_is_reported_once() {
    let (main, _main_loop) = MainContext::new();
    let (lines, sink) = channel_sink();
    let dispatcher = Dispatcher::thread_pool(2, main).unwrap().with_sink(sink);

    async { Err::<u8, _>(fault("disk full")) }.forget(&dispatcher);
    drop(dispatcher);

    let reported: Vec<_> = lines.collect().await;
    assert_eq!(
        reported,
        vec![(Level::Error, "unobserved task fault: disk full".to_string())],
        "Fault should reach the sink exactly once"
    );
}

#[tokio::test]
async fn canceled_forget_calls_nothing() {
    let (main, main_loop) = MainContext::new();
    let (lines, sink) = channel_sink();
    let dispatcher = Dispatcher::thread_pool(2, main).unwrap().with_sink(sink);
    let calls = Arc::new(AtomicU8::new(0));
    let calls_cl = Arc::clone(&calls);
    let calls_cl2 = Arc::clone(&calls);

    async { Err::<(), _>(Fault::Canceled) }.forget_with(
        &dispatcher,
        move |_| {
            calls_cl.fetch_add(1, Ordering::Relaxed);
        },
        move |_| {
            calls_cl2.fetch_add(1, Ordering::Relaxed);
        },
        true,
    );
    drop(dispatcher);
    main_loop.run().await;

    let reported: Vec<_> = lines.collect().await;
    assert_eq!(calls.load(Ordering::Relaxed), 0, "No callback should run");
    assert_eq!(
        reported,
        vec![(Level::Debug, "detached task was canceled".to_string())]
    );
}

#[tokio::test]
async fn closed_main_loop_is_reported() {
    let (main, main_loop) = MainContext::new();
    drop(main_loop);
    let (lines, sink) = channel_sink();
    let dispatcher = Dispatcher::thread_pool(1, main).unwrap().with_sink(sink);

    async { Err::<(), _>(fault("orphan")) }.forget_with(&dispatcher, |_| {}, |_| {}, true);
    drop(dispatcher);

    let reported: Vec<_> = lines.collect().await;
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, Level::Warn);
}

#[tokio::test(flavor = "multi_thread")]
async fn detach_runs_plain_future_on_tokio() {
    let (main, _main_loop) = MainContext::new();
    let dispatcher = Dispatcher::new(
        FnSpawner::new(|f| {
            tokio::spawn(f);
        }),
        main,
    );
    let (sender, receiver) = oneshot::channel();

    async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = sender.send(());
    }
    .log("detached work finished")
    .detach(&dispatcher);

    assert_eq!(receiver.await, Ok(()), "Detached future should run");
}

struct ShutDownSpawner;

impl Spawn for ShutDownSpawner {
    fn spawn_obj(&self, _: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        Err(SpawnError::shutdown())
    }
}

#[tokio::test]
async fn spawn_failure_is_reported_as_unhandled() {
    let (main, _main_loop) = MainContext::new();
    let (lines, sink) = channel_sink();
    let dispatcher = Dispatcher::new(ShutDownSpawner, main).with_sink(sink);
    let calls = Arc::new(AtomicU8::new(0));
    let calls_cl = Arc::clone(&calls);

    async { Ok::<_, Fault>(1u8) }.forget_then(&dispatcher, move |_| {
        calls_cl.fetch_add(1, Ordering::Relaxed);
    });
    drop(dispatcher);

    let reported: Vec<_> = lines.collect().await;
    assert_eq!(reported.len(), 1, "Spawn failure should be reported once");
    assert_eq!(reported[0].0, Level::Error);
    assert!(
        reported[0]
            .1
            .starts_with("unobserved task fault: detached task could not be spawned"),
        "Unexpected report: {}",
        reported[0].1
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0, "Task should never have run");
}
