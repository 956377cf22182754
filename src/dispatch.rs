//! Execution contexts for fire-and-forget tasks.
//!
//! A [`Dispatcher`] bundles what a detached task needs once the caller has let
//! go of it: a background spawner to drive it, a [`MainContext`] that error
//! handlers can be redirected to, and a [`LogSink`] that receives faults nobody
//! handled.
//!
//! The main context is a queue of callbacks. The host drains it from its
//! primary thread with [`MainLoop::run_pending`] (e.g. once per frame) or by
//! awaiting [`MainLoop::run`].
use std::{fmt::Display, io, sync::Arc};

use futures::{
    FutureExt, StreamExt,
    channel::mpsc,
    executor::ThreadPoolBuilder,
    future::BoxFuture,
    task::{FutureObj, Spawn, SpawnError, SpawnExt},
};

use crate::{
    error::TaskError,
    log_sink::{Level, LogFacade, LogSink},
};

type Job = Box<dyn FnOnce() + Send>;

/// Handle for posting callbacks onto the main execution context.
#[derive(Clone, Debug)]
pub struct MainContext {
    sender: mpsc::UnboundedSender<Job>,
}

/// The receiving side of a [`MainContext`], owned by the host's primary thread.
#[must_use = "callbacks posted to the main context only run when the loop is drained"]
pub struct MainLoop {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl MainContext {
    /// Creates a main context and the loop that runs its callbacks.
    pub fn new() -> (MainContext, MainLoop) {
        let (sender, receiver) = mpsc::unbounded();
        (MainContext { sender }, MainLoop { receiver })
    }

    /// Queues `job` to run on the main context.
    ///
    /// Returns `false` if the [`MainLoop`] was dropped, in which case the job is
    /// discarded.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.unbounded_send(Box::new(job)).is_ok()
    }
}

impl MainLoop {
    /// Runs every callback queued so far without waiting for new ones and
    /// returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(Some(job)) = self.receiver.next().now_or_never() {
            job();
            ran += 1;
        }
        ran
    }

    /// Runs callbacks as they arrive until every [`MainContext`] handle is
    /// dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.next().await {
            job();
        }
    }
}

/// Adapts a spawning closure to [`Spawn`], for executors that do not implement
/// it themselves.
///
/// # Example
/// ```
/// # use taskflow::{Dispatcher, FnSpawner, MainContext};
/// # #[tokio::main]
/// # async fn main() {
/// let (main, _main_loop) = MainContext::new();
/// let dispatcher = Dispatcher::new(FnSpawner::new(|f| { tokio::spawn(f); }), main);
/// # }
/// ```
pub struct FnSpawner<F>(F);

impl<F> FnSpawner<F>
where
    F: Fn(BoxFuture<'static, ()>),
{
    /// Wraps `spawn`, which is handed every detached task as a boxed future.
    pub fn new(spawn: F) -> Self {
        Self(spawn)
    }
}

impl<F> Spawn for FnSpawner<F>
where
    F: Fn(BoxFuture<'static, ()>),
{
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        (self.0)(Box::pin(future));
        Ok(())
    }
}

/// Where detached tasks run and where their leftovers are reported.
///
/// Cloning a dispatcher is cheap; clones share the spawner, main context and
/// sink.
#[derive(Clone)]
pub struct Dispatcher {
    spawner: Arc<dyn Spawn + Send + Sync>,
    main: MainContext,
    sink: Arc<dyn LogSink>,
}

impl Dispatcher {
    /// Creates a dispatcher that drives detached tasks on `spawner` and posts
    /// main-context callbacks to `main`. Unhandled faults go to [`LogFacade`].
    pub fn new(spawner: impl Spawn + Send + Sync + 'static, main: MainContext) -> Self {
        Self {
            spawner: Arc::new(spawner),
            main,
            sink: Arc::new(LogFacade),
        }
    }

    /// Creates a dispatcher backed by a fresh `futures` thread pool of
    /// `pool_size` threads.
    ///
    /// # Errors
    /// Returns the I/O error raised if the pool threads cannot be started.
    pub fn thread_pool(pool_size: usize, main: MainContext) -> io::Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .pool_size(pool_size)
            .name_prefix("taskflow-worker-")
            .create()?;
        Ok(Self::new(pool, main))
    }

    /// Replaces the sink that receives unhandled faults.
    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// The main context error handlers are redirected to.
    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    pub(crate) fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        if let Err(e) = self.spawner.spawn(future) {
            self.report_unhandled(&format_args!("detached task could not be spawned: {e}"));
        }
    }

    pub(crate) fn report_unhandled(&self, fault: &dyn Display) {
        self.sink
            .log(Level::Error, &format_args!("unobserved task fault: {fault}"));
    }

    pub(crate) fn report(&self, level: Level, message: &dyn Display) {
        self.sink.log(level, message);
    }
}

// Drives `task` on the dispatcher's spawner and routes its outcome. With
// `error_on_main` the fault handler is queued on the main context instead of
// running where the fault was observed.
pub(crate) fn forget_task<F, T, E, C, H>(
    dispatcher: &Dispatcher,
    task: F,
    on_complete: C,
    on_error: H,
    error_on_main: bool,
) where
    F: Future<Output = Result<T, TaskError<E>>> + Send + 'static,
    E: Send + 'static,
    C: FnOnce(T) + Send + 'static,
    H: FnOnce(E) + Send + 'static,
{
    let d = dispatcher.clone();
    dispatcher.spawn(async move {
        match task.await {
            Ok(value) => on_complete(value),
            Err(TaskError::Faulted(e)) if error_on_main => {
                if !d.main.post(move || on_error(e)) {
                    d.report(
                        Level::Warn,
                        &"main context is closed, dropping fault of detached task",
                    );
                }
            }
            Err(TaskError::Faulted(e)) => on_error(e),
            Err(TaskError::Canceled) => d.report(Level::Debug, &"detached task was canceled"),
        }
    });
}
