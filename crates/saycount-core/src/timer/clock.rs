//! Time sources for the countdown engine.
//!
//! The engine never calls `Utc::now()` or `thread::sleep` directly. Both go
//! through a [`Clock`], so the timing loop can run against the wall clock in
//! production and against a [`ManualClock`] in simulations and tests.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ClockError;

/// How a [`Clock::sleep`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The full duration elapsed.
    Elapsed,
    /// The stop signal fired first.
    Stopped,
}

/// Cooperative cancellation flag with a blocking, interruptible wait.
///
/// One signal belongs to one countdown run. Once stopped it stays stopped.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter. Idempotent.
    pub fn stop(&self) {
        let mut stopped = self.lock();
        *stopped = true;
        self.cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Block for up to `timeout`. Returns `true` if the signal fired.
    ///
    /// Wake-up latency after [`stop`](Self::stop) is the condition variable's,
    /// not the length of `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.lock();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Source of the current time plus the loop's only suspension point.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Result<DateTime<Utc>, ClockError>;

    /// Suspend for `duration`, returning early if `stop` fires.
    fn sleep(&self, duration: Duration, stop: &StopSignal) -> Wake;
}

/// Wall clock backed by [`SystemTime`], sleeping on the stop signal's condvar.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClockError::BeforeEpoch(e.to_string()))?;
        let secs = i64::try_from(since_epoch.as_secs()).map_err(|_| ClockError::OutOfRange)?;
        DateTime::from_timestamp(secs, since_epoch.subsec_nanos()).ok_or(ClockError::OutOfRange)
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> Wake {
        if stop.wait_timeout(duration) {
            Wake::Stopped
        } else {
            Wake::Elapsed
        }
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    overshoot: Duration,
    stalls: VecDeque<Duration>,
    available: bool,
    sleeps: Vec<Duration>,
}

/// Simulated clock. Sleeping advances simulated time instantly.
///
/// Every sleep oversleeps by the configured overshoot; a queued stall is added
/// on top of the next sleep only, to model a process that was descheduled.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                overshoot: Duration::ZERO,
                stalls: VecDeque::new(),
                available: true,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Move simulated time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now = shift(state.now, by);
    }

    /// Oversleep every subsequent sleep by `overshoot`.
    pub fn set_overshoot(&self, overshoot: Duration) {
        self.lock().overshoot = overshoot;
    }

    /// Add `stall` to the next sleep only.
    pub fn push_stall(&self, stall: Duration) {
        self.lock().stalls.push_back(stall);
    }

    /// Make [`Clock::now`] fail while `false`.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Requested (not effective) durations of every completed sleep.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        let state = self.lock();
        if state.available {
            Ok(state.now)
        } else {
            Err(ClockError::Unavailable)
        }
    }

    fn sleep(&self, duration: Duration, stop: &StopSignal) -> Wake {
        if stop.is_stopped() {
            return Wake::Stopped;
        }
        {
            let mut state = self.lock();
            let stall = state.stalls.pop_front().unwrap_or_default();
            let effective = duration + state.overshoot + stall;
            state.now = shift(state.now, effective);
            state.sleeps.push(duration);
        }
        if stop.is_stopped() {
            Wake::Stopped
        } else {
            Wake::Elapsed
        }
    }
}

fn shift(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn epoch_plus(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn stop_signal_wakes_waiter_early() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let started = Instant::now();
                let fired = signal.wait_timeout(Duration::from_secs(5));
                (fired, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (fired, waited) = waiter.join().unwrap();
        assert!(fired);
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }

    #[test]
    fn stop_signal_times_out_when_not_stopped() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stopped_signal_returns_immediately() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stop();
        assert!(signal.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn system_clock_is_after_2020() {
        let now = SystemClock.now().unwrap();
        assert!(now.timestamp() > 1_577_836_800);
    }

    #[test]
    fn manual_clock_sleep_advances_time_with_overshoot_and_stall() {
        let clock = ManualClock::new(epoch_plus(0));
        let stop = StopSignal::new();
        clock.set_overshoot(Duration::from_millis(5));
        clock.push_stall(Duration::from_millis(2_000));

        assert_eq!(clock.sleep(Duration::from_millis(100), &stop), Wake::Elapsed);
        assert_eq!(clock.now().unwrap(), epoch_plus(2_105));

        assert_eq!(clock.sleep(Duration::from_millis(100), &stop), Wake::Elapsed);
        assert_eq!(clock.now().unwrap(), epoch_plus(2_210));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn manual_clock_advance_moves_time_without_recording_a_sleep() {
        let clock = ManualClock::new(epoch_plus(0));
        clock.advance(Duration::from_millis(1_250));
        assert_eq!(clock.now().unwrap(), epoch_plus(1_250));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn manual_clock_does_not_advance_when_stopped() {
        let clock = ManualClock::new(epoch_plus(0));
        let stop = StopSignal::new();
        stop.stop();
        assert_eq!(clock.sleep(Duration::from_secs(1), &stop), Wake::Stopped);
        assert_eq!(clock.now().unwrap(), epoch_plus(0));
    }

    #[test]
    fn manual_clock_can_be_switched_off() {
        let clock = ManualClock::new(epoch_plus(0));
        clock.set_available(false);
        assert!(matches!(clock.now(), Err(ClockError::Unavailable)));
        clock.set_available(true);
        assert!(clock.now().is_ok());
    }
}
