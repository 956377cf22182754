//! Outcome types shared by the fault-aware combinators.
//!
//! A task that can fail resolves to `Result<T, TaskError<E>>`. Faults carry the
//! caller's error type, while cancellation is a separate variant so that
//! [`catch`](crate::task_ext::TryTaskExt::catch) and friends can let it through
//! untouched.

use std::error::Error;

use thiserror::Error;

/// Boxed, thread-safe error usable as a catch-all fault type.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Returned by a [`Delay`](crate::timing::Delay) whose cancellation token fired
/// before the delay elapsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("task was canceled")]
pub struct Canceled;

/// How a fault-aware task failed.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum TaskError<E> {
    /// The task faulted with an error of its own.
    #[error("task faulted: {0}")]
    Faulted(E),

    /// The task observed a cancellation request.
    #[error("task was canceled")]
    Canceled,
}

impl<E> TaskError<E> {
    /// Returns `true` for [`TaskError::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }

    /// Returns the fault, or `None` if the task was canceled.
    pub fn into_fault(self) -> Option<E> {
        match self {
            TaskError::Faulted(e) => Some(e),
            TaskError::Canceled => None,
        }
    }

    /// Maps the fault type, leaving cancellation as is.
    pub fn map_fault<U>(self, f: impl FnOnce(E) -> U) -> TaskError<U> {
        match self {
            TaskError::Faulted(e) => TaskError::Faulted(f(e)),
            TaskError::Canceled => TaskError::Canceled,
        }
    }
}

impl<E> From<Canceled> for TaskError<E> {
    fn from(_: Canceled) -> Self {
        TaskError::Canceled
    }
}

/// Narrows a fault to a more specific type.
///
/// Used by [`catch_kind`](crate::task_ext::TryTaskExt::catch_kind) to handle
/// only faults of one concrete type. On mismatch the original value is handed
/// back so it can keep propagating.
pub trait Downcast<S>: Sized {
    fn downcast_fault(self) -> Result<S, Self>;
}

impl<S> Downcast<S> for BoxError
where
    S: Error + Send + Sync + 'static,
{
    fn downcast_fault(self) -> Result<S, Self> {
        self.downcast::<S>().map(|s| *s)
    }
}
