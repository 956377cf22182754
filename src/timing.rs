//! Delays measured in seconds against an explicit time base.
//!
//! [`Delay`] is a future that resolves once its duration has elapsed on the
//! chosen [`TimeBase`], or with [`Canceled`] if its cancellation token fires
//! first. [`After`] defers the start of another future behind a delay.
//!
//! Wall-clock delays are driven by a single background timer thread that is
//! started on first use. Frame-time delays are woken by
//! [`FrameClock::advance`](crate::clock::FrameClock::advance).

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock,
        mpsc::{self, RecvTimeoutError, Sender},
    },
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use futures::ready;
use pin_project_lite::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::{
    clock::{FrameClock, TimeBase},
    error::Canceled,
};

static TIMER: OnceLock<Option<Sender<TimerEntry>>> = OnceLock::new();

// Shared between a delay and its heap entry. The delay clears it on release so
// the timer thread never holds a waker past the delay's lifetime.
type WakerSlot = Arc<Mutex<Option<Waker>>>;

fn lock_slot(slot: &WakerSlot) -> MutexGuard<'_, Option<Waker>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

struct TimerEntry {
    at: Instant,
    slot: WakerSlot,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the earliest deadline sits on top of the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

fn timer() -> Option<&'static Sender<TimerEntry>> {
    TIMER
        .get_or_init(|| {
            let (sender, receiver) = mpsc::channel::<TimerEntry>();
            let spawned = std::thread::Builder::new()
                .name("taskflow-timer".into())
                .spawn(move || {
                    let mut heap = BinaryHeap::new();
                    loop {
                        let next = match heap.peek() {
                            Some(TimerEntry { at, .. }) => {
                                let timeout = at.saturating_duration_since(Instant::now());
                                receiver.recv_timeout(timeout)
                            }
                            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                        };
                        match next {
                            Ok(entry) => heap.push(entry),
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                        let now = Instant::now();
                        while heap.peek().is_some_and(|e| e.at <= now) {
                            let waker = heap.pop().and_then(|entry| lock_slot(&entry.slot).take());
                            if let Some(waker) = waker {
                                waker.wake();
                            }
                        }
                    }
                });
            match spawned {
                Ok(_) => {
                    log::debug!("timer thread started");
                    Some(sender)
                }
                Err(e) => {
                    log::error!("failed to start timer thread, delays will busy-poll: {e}");
                    None
                }
            }
        })
        .as_ref()
}

// Converts seconds to a duration. Zero, negative and NaN map to zero, values too
// large for `Duration` map to `None`.
fn duration_from_secs(seconds: f32) -> Option<Duration> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f32(seconds).ok()
}

enum Deadline {
    // Resolves on the second poll.
    NextPoll { yielded: bool },
    Wall(Instant),
    Frame {
        clock: FrameClock,
        at: Duration,
        scaled: bool,
    },
    Never,
}

/// A future that resolves after a duration measured on a [`TimeBase`].
///
/// The countdown starts when the `Delay` is created, not when it is first
/// polled. A zero or negative duration does not resolve synchronously: the
/// first poll yields and the delay completes on the next one, so awaiting a
/// delay always crosses at least one scheduling point.
///
/// If a [`CancellationToken`] is attached and canceled before the delay
/// elapses, the delay resolves with `Err(Canceled)` as soon as it is woken by
/// the token.
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Delay {
    deadline: Deadline,
    cancellation: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    clock_key: Option<u64>,
    armed: Option<WakerSlot>,
}

impl Delay {
    /// Creates a delay of `duration` on the given time base.
    pub fn new(duration: Duration, time_base: TimeBase) -> Self {
        let deadline = if duration.is_zero() {
            Deadline::NextPoll { yielded: false }
        } else {
            match time_base {
                TimeBase::Realtime => Instant::now()
                    .checked_add(duration)
                    .map_or(Deadline::Never, Deadline::Wall),
                TimeBase::Scaled(clock) => Self::frame_deadline(clock, duration, true),
                TimeBase::Unscaled(clock) => Self::frame_deadline(clock, duration, false),
            }
        };
        Self {
            deadline,
            cancellation: None,
            clock_key: None,
            armed: None,
        }
    }

    /// Creates a delay of `seconds` on the given time base.
    ///
    /// Zero, negative and NaN values behave like a zero duration. A value too
    /// large to represent never elapses; such a delay only resolves through
    /// cancellation.
    pub fn secs(seconds: f32, time_base: TimeBase) -> Self {
        match duration_from_secs(seconds) {
            Some(duration) => Self::new(duration, time_base),
            None => {
                log::debug!("delay of {seconds}s is out of range, it will never elapse");
                Self {
                    deadline: Deadline::Never,
                    cancellation: None,
                    clock_key: None,
                    armed: None,
                }
            }
        }
    }

    /// Attaches a cancellation token to this delay.
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.cancellation = Some(Box::pin(token.clone().cancelled_owned()));
        self
    }

    fn frame_deadline(clock: FrameClock, duration: Duration, scaled: bool) -> Deadline {
        match clock.now(scaled).checked_add(duration) {
            Some(at) => Deadline::Frame { clock, at, scaled },
            None => Deadline::Never,
        }
    }

    fn arm_timer(&mut self, at: Instant, waker: &Waker) {
        if let Some(slot) = &self.armed {
            let mut current = lock_slot(slot);
            if !current.as_ref().is_some_and(|w| w.will_wake(waker)) {
                *current = Some(waker.clone());
            }
            return;
        }
        match timer() {
            Some(sender) => {
                let slot = Arc::new(Mutex::new(Some(waker.clone())));
                let entry = TimerEntry {
                    at,
                    slot: Arc::clone(&slot),
                };
                if sender.send(entry).is_err() {
                    log::warn!("timer thread is gone, falling back to busy-polling");
                    waker.wake_by_ref();
                    return;
                }
                self.armed = Some(slot);
            }
            None => waker.wake_by_ref(),
        }
    }

    fn release(&mut self) {
        self.cancellation = None;
        if let Some(slot) = self.armed.take() {
            lock_slot(&slot).take();
        }
        if let Deadline::Frame { clock, .. } = &self.deadline {
            clock.deregister(&mut self.clock_key);
        }
    }
}

impl Future for Delay {
    type Output = Result<(), Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let canceled = match &mut this.cancellation {
            Some(cancelled) => cancelled.as_mut().poll(cx).is_ready(),
            None => false,
        };
        if canceled {
            this.release();
            return Poll::Ready(Err(Canceled));
        }

        let elapsed = match &mut this.deadline {
            Deadline::NextPoll { yielded } => {
                if *yielded {
                    true
                } else {
                    *yielded = true;
                    cx.waker().wake_by_ref();
                    false
                }
            }
            Deadline::Wall(at) => {
                let at = *at;
                if Instant::now() >= at {
                    true
                } else {
                    this.arm_timer(at, cx.waker());
                    false
                }
            }
            Deadline::Frame { clock, at, scaled } => {
                clock.register(&mut this.clock_key, *at, *scaled, cx.waker())
            }
            Deadline::Never => false,
        };

        if elapsed {
            this.release();
            return Poll::Ready(Ok(()));
        }
        Poll::Pending
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        self.release();
    }
}

/// Creates a delay of `seconds` on `time_base` that resolves with
/// `Err(Canceled)` if `cancellation` fires first.
///
/// Shorthand for `Delay::secs(seconds, time_base).with_cancellation(cancellation)`.
///
/// # Example
/// ```
/// # use taskflow::{CancellationToken, TimeBase, delay_secs, Canceled};
/// # futures::executor::block_on(async {
/// let token = CancellationToken::new();
/// let delay = delay_secs(30.0, TimeBase::Realtime, &token);
///
/// token.cancel();
/// assert_eq!(delay.await, Err(Canceled));
/// # });
/// ```
pub fn delay_secs(seconds: f32, time_base: TimeBase, cancellation: &CancellationToken) -> Delay {
    Delay::secs(seconds, time_base).with_cancellation(cancellation)
}

pin_project! {
    /// A future that starts polling its inner future only after a [`Delay`].
    ///
    /// Created by [`TaskExt::after`](crate::task_ext::TaskExt::after). If the
    /// delay is canceled the inner future is never polled and `After` resolves
    /// with `Err(Canceled)`. Once started, the inner future runs to completion
    /// regardless of later cancellation.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct After<F> {
        #[pin]
        future: F,
        delay: Option<Delay>,
    }
}

impl<F> After<F> {
    pub(crate) fn new(future: F, delay: Delay) -> Self {
        Self {
            future,
            delay: Some(delay),
        }
    }

    /// Consumes the `After` and returns the inner future.
    pub fn inner(self) -> F {
        self.future
    }
}

impl<F: Future> Future for After<F> {
    type Output = Result<F::Output, Canceled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Some(delay) = this.delay.as_mut() {
            let started = ready!(Pin::new(delay).poll(cx));
            this.delay.take();
            if let Err(canceled) = started {
                return Poll::Ready(Err(canceled));
            }
        }
        this.future.poll(cx).map(Ok)
    }
}
