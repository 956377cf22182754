//! Time bases for delays.
//!
//! A delay is measured either against the wall clock or against a
//! [`FrameClock`] that the host advances once per frame. The frame clock keeps
//! two running totals: unscaled frame time, and frame time multiplied by a
//! mutable time scale (so a scale of `0.0` pauses scaled delays while unscaled
//! ones keep running).
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    task::Waker,
    time::Duration,
};

/// Which clock a delay is measured against.
#[derive(Clone, Debug, Default)]
pub enum TimeBase {
    /// Wall-clock time, unaffected by any time scale.
    #[default]
    Realtime,

    /// Frame time of the given clock, multiplied by its time scale.
    Scaled(FrameClock),

    /// Frame time of the given clock, ignoring its time scale.
    Unscaled(FrameClock),
}

impl TimeBase {
    /// Picks a frame time base the way game engines expose it: with
    /// `ignore_time_scale` set the delay follows unscaled frame time, otherwise
    /// it follows scaled frame time.
    pub fn frame(clock: &FrameClock, ignore_time_scale: bool) -> Self {
        if ignore_time_scale {
            TimeBase::Unscaled(clock.clone())
        } else {
            TimeBase::Scaled(clock.clone())
        }
    }
}

struct Waiter {
    deadline: Duration,
    scaled: bool,
    waker: Waker,
}

struct ClockState {
    time_scale: f64,
    scaled: Duration,
    unscaled: Duration,
    next_key: u64,
    waiters: HashMap<u64, Waiter>,
}

impl ClockState {
    fn now(&self, scaled: bool) -> Duration {
        if scaled { self.scaled } else { self.unscaled }
    }
}

/// A host-driven frame clock with an adjustable time scale.
///
/// The clock does not tick by itself. The host's update loop calls
/// [`advance`](Self::advance) with the real time that passed since the previous
/// frame, which wakes every delay whose deadline was reached. Clones share the
/// same clock.
///
/// # Example
/// ```
/// # use std::time::Duration;
/// # use taskflow::{Delay, FrameClock, TimeBase};
/// let clock = FrameClock::new();
/// clock.set_time_scale(2.0);
///
/// let delay = Delay::secs(1.0, TimeBase::Scaled(clock.clone()));
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(clock.scaled_elapsed(), Duration::from_secs(1));
/// # drop(delay);
/// ```
#[derive(Clone)]
pub struct FrameClock {
    state: Arc<Mutex<ClockState>>,
}

impl FrameClock {
    /// Creates a clock at zero elapsed time with a time scale of `1.0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                time_scale: 1.0,
                scaled: Duration::ZERO,
                unscaled: Duration::ZERO,
                next_key: 0,
                waiters: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current time scale.
    pub fn time_scale(&self) -> f32 {
        self.state().time_scale as f32
    }

    /// Sets the time scale applied to subsequent frames.
    ///
    /// Negative and non-finite values are treated as `0.0`.
    pub fn set_time_scale(&self, time_scale: f32) {
        let time_scale = if time_scale.is_finite() && time_scale > 0.0 {
            f64::from(time_scale)
        } else {
            0.0
        };
        self.state().time_scale = time_scale;
    }

    /// Total scaled frame time since the clock was created.
    pub fn scaled_elapsed(&self) -> Duration {
        self.state().scaled
    }

    /// Total unscaled frame time since the clock was created.
    pub fn unscaled_elapsed(&self) -> Duration {
        self.state().unscaled
    }

    /// Advances the clock by one frame of `delta` real time and wakes the
    /// delays that became due.
    pub fn advance(&self, delta: Duration) {
        let due: Vec<Waker> = {
            let mut state = self.state();
            let scaled_delta = Duration::try_from_secs_f64(delta.as_secs_f64() * state.time_scale)
                .unwrap_or(Duration::MAX);
            state.scaled = state.scaled.saturating_add(scaled_delta);
            state.unscaled = state.unscaled.saturating_add(delta);

            let (scaled, unscaled) = (state.scaled, state.unscaled);
            let mut due = Vec::new();
            state.waiters.retain(|_, w| {
                let now = if w.scaled { scaled } else { unscaled };
                if now >= w.deadline {
                    due.push(w.waker.clone());
                    false
                } else {
                    true
                }
            });
            due
        };
        for waker in due {
            waker.wake();
        }
    }

    pub(crate) fn now(&self, scaled: bool) -> Duration {
        self.state().now(scaled)
    }

    // Parks `waker` until the chosen time line reaches `deadline`. Returns `true`
    // if the deadline already passed, in which case any previous registration
    // under `key` is dropped.
    pub(crate) fn register(
        &self,
        key: &mut Option<u64>,
        deadline: Duration,
        scaled: bool,
        waker: &Waker,
    ) -> bool {
        let mut state = self.state();
        if state.now(scaled) >= deadline {
            if let Some(k) = key.take() {
                state.waiters.remove(&k);
            }
            return true;
        }
        let k = match *key {
            Some(k) => k,
            None => {
                state.next_key += 1;
                *key = Some(state.next_key);
                state.next_key
            }
        };
        state.waiters.insert(
            k,
            Waiter {
                deadline,
                scaled,
                waker: waker.clone(),
            },
        );
        false
    }

    pub(crate) fn deregister(&self, key: &mut Option<u64>) {
        if let Some(k) = key.take() {
            self.state().waiters.remove(&k);
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.state().waiters.len()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("FrameClock")
            .field("time_scale", &state.time_scale)
            .field("scaled", &state.scaled)
            .field("unscaled", &state.unscaled)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
