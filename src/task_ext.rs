use std::fmt::Display;

use crate::{
    combinators::{
        AnyFault, Catch, FaultAs, FaultIf, FaultKind, Finally, LogOnComplete, TryFinally,
    },
    dispatch::{Dispatcher, forget_task},
    error::{Downcast, TaskError},
    log_sink::{Level, LogFacade, LogSink},
    timing::{After, Delay},
};

/// Extend `Future` with continuation operators that do not care about faults.
pub trait TaskExt: Future {
    /// Runs `on_finally` exactly once after this future resolves, then yields
    /// its output unchanged.
    ///
    /// The callback runs for every outcome, including faulted and canceled
    /// tasks. A panic in the callback propagates and replaces the outcome. If the
    /// returned future is dropped before the inner one resolves, the callback
    /// does not run.
    fn finally<C>(self, on_finally: C) -> Finally<Self, C>
    where
        Self: Sized,
        C: FnOnce(),
    {
        Finally::new(self, on_finally)
    }

    /// Logs `message` at info level through the `log` crate once this future
    /// resolves.
    fn log<M: Display>(self, message: M) -> LogOnComplete<Self, LogFacade, M>
    where
        Self: Sized,
    {
        LogOnComplete::new(self, LogFacade, Level::Info, message)
    }

    /// Logs `message` at warning level through the `log` crate once this
    /// future resolves.
    fn log_warning<M: Display>(self, message: M) -> LogOnComplete<Self, LogFacade, M>
    where
        Self: Sized,
    {
        LogOnComplete::new(self, LogFacade, Level::Warn, message)
    }

    /// Logs `message` at error level through the `log` crate once this future
    /// resolves.
    fn log_error<M: Display>(self, message: M) -> LogOnComplete<Self, LogFacade, M>
    where
        Self: Sized,
    {
        LogOnComplete::new(self, LogFacade, Level::Error, message)
    }

    /// Emits `message` on `sink` at `level` once this future resolves.
    ///
    /// The message is emitted for every outcome and never changes it.
    fn log_to<S, M>(self, sink: S, level: Level, message: M) -> LogOnComplete<Self, S, M>
    where
        Self: Sized,
        S: LogSink,
        M: Display,
    {
        LogOnComplete::new(self, sink, level, message)
    }

    /// Starts polling this future only after `delay` elapsed.
    ///
    /// Resolves with `Err(Canceled)` without ever polling this future if the
    /// delay is canceled.
    fn after(self, delay: Delay) -> After<Self>
    where
        Self: Sized,
    {
        After::new(self, delay)
    }

    /// Runs this future to completion on the dispatcher's spawner.
    ///
    /// Only futures that cannot fault can be detached. Fault-aware tasks go
    /// through [`TryTaskExt::forget`] and its variants, which report or handle
    /// the fault:
    ///
    /// ```compile_fail
    /// # use taskflow::{Dispatcher, MainContext, TaskError, TaskExt};
    /// let (main, _main_loop) = MainContext::new();
    /// let dispatcher = Dispatcher::thread_pool(1, main).unwrap();
    /// async { Err::<(), _>(TaskError::Faulted("disk full")) }.detach(&dispatcher);
    /// ```
    fn detach(self, dispatcher: &Dispatcher)
    where
        Self: Future<Output = ()> + Sized + Send + 'static,
    {
        dispatcher.spawn(self);
    }
}

impl<T> TaskExt for T where T: Future {}

/// Extend fault-aware tasks, futures resolving to `Result<T, TaskError<E>>`,
/// with catch, finally and fire-and-forget operators.
///
/// Plain `Result` futures can be lifted with
/// `futures::TryFutureExt::map_err(TaskError::Faulted)`.
pub trait TryTaskExt<T, E>: Future<Output = Result<T, TaskError<E>>> {
    /// Passes any fault to `on_error` and completes with `Ok(())`.
    ///
    /// Successful tasks complete with `Ok(())` without calling the handler.
    /// Cancellation is not caught.
    fn catch<H>(self, on_error: H) -> Catch<Self, AnyFault, H>
    where
        Self: Sized,
        H: FnOnce(E),
    {
        Catch::new(self, AnyFault, on_error)
    }

    /// Passes the fault to `on_error` only if `predicate` accepts it; any other
    /// fault propagates unchanged.
    fn catch_if<P, H>(self, predicate: P, on_error: H) -> Catch<Self, FaultIf<P>, H>
    where
        Self: Sized,
        P: FnOnce(&E) -> bool,
        H: FnOnce(E),
    {
        Catch::new(self, FaultIf(predicate), on_error)
    }

    /// Lets `classify` narrow the fault. `Ok(s)` goes to `on_error`, `Err(e)`
    /// propagates unchanged.
    fn catch_as<S, K, H>(self, classify: K, on_error: H) -> Catch<Self, FaultAs<K>, H>
    where
        Self: Sized,
        K: FnOnce(E) -> Result<S, E>,
        H: FnOnce(S),
    {
        Catch::new(self, FaultAs(classify), on_error)
    }

    /// Passes the fault to `on_error` only if it is an `S`.
    ///
    /// # Example
    /// ```
    /// # use taskflow::{BoxError, TaskError, TryTaskExt};
    /// # futures::executor::block_on(async {
    /// let task = async {
    ///     let e: BoxError = Box::new(std::fmt::Error);
    ///     Err::<(), _>(TaskError::Faulted(e))
    /// };
    /// let r = task
    ///     .catch_kind(|_: std::fmt::Error| println!("formatting failed"))
    ///     .await;
    /// assert!(r.is_ok());
    /// # });
    /// ```
    fn catch_kind<S, H>(self, on_error: H) -> Catch<Self, FaultKind<S>, H>
    where
        Self: Sized,
        E: Downcast<S>,
        H: FnOnce(S),
    {
        Catch::new(self, FaultKind::new(), on_error)
    }

    /// Runs the fallible `on_finally` exactly once after this task resolves.
    ///
    /// If the callback returns `Err(e)`, the task faults with `e` whatever its
    /// own outcome was. The superseded outcome is logged at debug level.
    fn try_finally<C>(self, on_finally: C) -> TryFinally<Self, C>
    where
        Self: Sized,
        C: FnOnce() -> Result<(), E>,
    {
        TryFinally::new(self, on_finally)
    }

    /// Runs this task detached. A fault is reported on the dispatcher's sink.
    fn forget(self, dispatcher: &Dispatcher)
    where
        Self: Sized + Send + 'static,
        E: Display + Send + 'static,
    {
        self.forget_then(dispatcher, |_| {});
    }

    /// Runs this task detached and passes its value to `on_complete`. A fault
    /// is reported on the dispatcher's sink.
    fn forget_then<C>(self, dispatcher: &Dispatcher, on_complete: C)
    where
        Self: Sized + Send + 'static,
        E: Display + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let d = dispatcher.clone();
        forget_task(
            dispatcher,
            self,
            on_complete,
            move |e| d.report_unhandled(&e),
            false,
        );
    }

    /// Runs this task detached, passing its value to `on_complete` or its
    /// fault to `on_error`.
    ///
    /// With `error_on_main` set, `on_error` is queued on the dispatcher's
    /// [`MainContext`](crate::dispatch::MainContext) and runs when the host
    /// drains its loop; otherwise it runs where the fault was observed.
    /// Cancellation calls neither callback.
    fn forget_with<C, H>(
        self,
        dispatcher: &Dispatcher,
        on_complete: C,
        on_error: H,
        error_on_main: bool,
    ) where
        Self: Sized + Send + 'static,
        E: Send + 'static,
        C: FnOnce(T) + Send + 'static,
        H: FnOnce(E) + Send + 'static,
    {
        forget_task(dispatcher, self, on_complete, on_error, error_on_main);
    }
}

impl<F, T, E> TryTaskExt<T, E> for F where F: Future<Output = Result<T, TaskError<E>>> {}
