//! Chaining helpers for asynchronous tasks.
//!
//! `taskflow` layers a small set of continuation operators over ordinary
//! futures: delays measured in seconds with cooperative cancellation,
//! `finally` and `catch` style fault handling, completion logging, and
//! fire-and-forget detachment with callbacks.
//!
//! The crate is designed to work independently of any specific async runtime.
//! Delays run on their own timer thread or on a host-driven [`FrameClock`], and
//! detached tasks are spawned through any [`futures::task::Spawn`]
//! implementation.
//!
//! Features include:
//! - [`Delay`] and [`delay_secs`] for wall-clock or frame-time delays with a
//!   [`CancellationToken`] (re-exported from `tokio-util`, usable without a
//!   tokio runtime)
//! - [`TaskExt`] for any future: `finally`, `log`, `after`, `detach`
//! - [`TryTaskExt`] for fault-aware tasks resolving to
//!   `Result<T, TaskError<E>>`: `catch`, `catch_if`, `catch_as`, `catch_kind`,
//!   `try_finally` and the `forget` family
//! - A [`Dispatcher`] that decides where detached tasks run, where their error
//!   handlers run, and where unhandled faults are reported
//!
//! # Example
//! ```
//! use taskflow::{CancellationToken, TaskError, TaskExt, TimeBase, TryTaskExt, delay_secs};
//!
//! # futures::executor::block_on(async {
//! let token = CancellationToken::new();
//! let r = async {
//!     delay_secs(0.01, TimeBase::Realtime, &token).await?;
//!     Err::<u32, _>(TaskError::Faulted("no signal"))
//! }
//! .log("probe finished")
//! .catch(|e| eprintln!("probe failed: {e}"))
//! .await;
//! assert_eq!(r, Ok(()));
//! # });
//! ```

pub mod clock;
pub mod combinators;
pub mod dispatch;
pub mod error;
pub mod log_sink;
pub mod task_ext;
pub mod timing;

pub use clock::{FrameClock, TimeBase};
pub use dispatch::{Dispatcher, FnSpawner, MainContext, MainLoop};
pub use error::{BoxError, Canceled, Downcast, TaskError};
pub use log_sink::{Level, LogFacade, LogSink};
pub use task_ext::{TaskExt, TryTaskExt};
pub use timing::{Delay, delay_secs};
pub use tokio_util::sync::CancellationToken;
