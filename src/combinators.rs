//! Futures returned by the [`TaskExt`](crate::task_ext::TaskExt) and
//! [`TryTaskExt`](crate::task_ext::TryTaskExt) operators.
//!
//! Each combinator owns the future it wraps, polls it to completion and then
//! runs its continuation exactly once. None of them introduce suspension points
//! of their own.
use std::{
    fmt::Display,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use futures::ready;
use pin_project_lite::pin_project;

use crate::{
    error::{Downcast, TaskError},
    log_sink::{Level, LogSink},
};

pin_project! {
    /// Runs a callback once the inner future resolves, whatever its output.
    ///
    /// Created by [`TaskExt::finally`](crate::task_ext::TaskExt::finally).
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Finally<F, C> {
        #[pin]
        future: F,
        on_finally: Option<C>,
    }
}

impl<F, C> Finally<F, C> {
    pub(crate) fn new(future: F, on_finally: C) -> Self {
        Self {
            future,
            on_finally: Some(on_finally),
        }
    }
}

impl<F, C> Future for Finally<F, C>
where
    F: Future,
    C: FnOnce(),
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.future.poll(cx));
        if let Some(on_finally) = this.on_finally.take() {
            on_finally();
        }
        Poll::Ready(output)
    }
}

pin_project! {
    /// Like [`Finally`], but the callback may fault. A callback fault replaces
    /// the outcome of the inner task.
    ///
    /// Created by [`TryTaskExt::try_finally`](crate::task_ext::TryTaskExt::try_finally).
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct TryFinally<F, C> {
        #[pin]
        future: F,
        on_finally: Option<C>,
    }
}

impl<F, C> TryFinally<F, C> {
    pub(crate) fn new(future: F, on_finally: C) -> Self {
        Self {
            future,
            on_finally: Some(on_finally),
        }
    }
}

impl<F, C, T, E> Future for TryFinally<F, C>
where
    F: Future<Output = Result<T, TaskError<E>>>,
    C: FnOnce() -> Result<(), E>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.future.poll(cx));
        let Some(on_finally) = this.on_finally.take() else {
            return Poll::Ready(output);
        };
        match on_finally() {
            Ok(()) => Poll::Ready(output),
            Err(e) => {
                let superseded = match &output {
                    Ok(_) => "succeeded",
                    Err(TaskError::Faulted(_)) => "faulted",
                    Err(TaskError::Canceled) => "was canceled",
                };
                log::debug!("finally callback faulted, superseding a task that {superseded}");
                Poll::Ready(Err(TaskError::Faulted(e)))
            }
        }
    }
}

/// Decides whether a fault is consumed by a catch handler.
///
/// `Ok` hands the (possibly narrowed) fault to the handler, `Err` gives the
/// fault back to keep propagating.
pub trait FaultFilter<E> {
    type Caught;

    fn filter(self, fault: E) -> Result<Self::Caught, E>;
}

/// Catches every fault.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyFault;

impl<E> FaultFilter<E> for AnyFault {
    type Caught = E;

    fn filter(self, fault: E) -> Result<E, E> {
        Ok(fault)
    }
}

/// Catches faults for which a predicate holds.
pub struct FaultIf<P>(pub(crate) P);

impl<E, P> FaultFilter<E> for FaultIf<P>
where
    P: FnOnce(&E) -> bool,
{
    type Caught = E;

    fn filter(self, fault: E) -> Result<E, E> {
        if (self.0)(&fault) { Ok(fault) } else { Err(fault) }
    }
}

/// Catches faults a classifier narrows to another type.
pub struct FaultAs<K>(pub(crate) K);

impl<E, S, K> FaultFilter<E> for FaultAs<K>
where
    K: FnOnce(E) -> Result<S, E>,
{
    type Caught = S;

    fn filter(self, fault: E) -> Result<S, E> {
        (self.0)(fault)
    }
}

/// Catches faults of one concrete error type.
pub struct FaultKind<S>(PhantomData<fn() -> S>);

impl<S> FaultKind<S> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E, S> FaultFilter<E> for FaultKind<S>
where
    E: Downcast<S>,
{
    type Caught = S;

    fn filter(self, fault: E) -> Result<S, E> {
        fault.downcast_fault()
    }
}

pin_project! {
    /// Hands matching faults of the inner task to a handler and completes
    /// successfully; lets everything else through.
    ///
    /// Created by the `catch` family on
    /// [`TryTaskExt`](crate::task_ext::TryTaskExt). Cancellation is never caught.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Catch<F, K, H> {
        #[pin]
        future: F,
        handler: Option<(K, H)>,
    }
}

impl<F, K, H> Catch<F, K, H> {
    pub(crate) fn new(future: F, filter: K, handler: H) -> Self {
        Self {
            future,
            handler: Some((filter, handler)),
        }
    }
}

impl<F, K, H, T, E> Future for Catch<F, K, H>
where
    F: Future<Output = Result<T, TaskError<E>>>,
    K: FaultFilter<E>,
    H: FnOnce(K::Caught),
{
    type Output = Result<(), TaskError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let fault = match ready!(this.future.poll(cx)) {
            Ok(_) => return Poll::Ready(Ok(())),
            Err(TaskError::Canceled) => return Poll::Ready(Err(TaskError::Canceled)),
            Err(TaskError::Faulted(fault)) => fault,
        };
        let Some((filter, handler)) = this.handler.take() else {
            return Poll::Ready(Err(TaskError::Faulted(fault)));
        };
        match filter.filter(fault) {
            Ok(caught) => {
                handler(caught);
                Poll::Ready(Ok(()))
            }
            Err(fault) => Poll::Ready(Err(TaskError::Faulted(fault))),
        }
    }
}

pin_project! {
    /// Emits a message on a [`LogSink`] once the inner future resolves and
    /// passes the output through unchanged.
    ///
    /// Created by the `log*` operators on [`TaskExt`](crate::task_ext::TaskExt).
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct LogOnComplete<F, S, M> {
        #[pin]
        future: F,
        sink: S,
        level: Level,
        message: Option<M>,
    }
}

impl<F, S, M> LogOnComplete<F, S, M> {
    pub(crate) fn new(future: F, sink: S, level: Level, message: M) -> Self {
        Self {
            future,
            sink,
            level,
            message: Some(message),
        }
    }
}

impl<F, S, M> Future for LogOnComplete<F, S, M>
where
    F: Future,
    S: LogSink,
    M: Display,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.future.poll(cx));
        if let Some(message) = this.message.take() {
            this.sink.log(*this.level, &message);
        }
        Poll::Ready(output)
    }
}
