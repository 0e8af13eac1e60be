//! Countdown engine implementation.
//!
//! The engine runs one countdown at a time on its own timing-loop thread and
//! hands every utterance to the [`AnnouncementQueue`], so slow speech never
//! delays a boundary check.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Completed | Stopped | Failed) -> Running -> ...
//! ```
//!
//! A finished engine (any outcome) can be started again; `start` resets the
//! whole run state in one critical section.
//!
//! ## Usage
//!
//! ```no_run
//! use saycount_core::{CountdownEngine, LogAnnouncer};
//!
//! let engine = CountdownEngine::new(LogAnnouncer)?;
//! let countdown = engine.scoped();
//! countdown.start_with(10, |count| println!("{count}"))?;
//! countdown.wait();
//! # Ok::<(), saycount_core::CountdownError>(())
//! ```
//!
//! ## Stop semantics
//!
//! `stop` is cooperative. The loop's only suspension point is the boundary
//! sleep, which wakes as soon as the stop signal fires; a stop that arrives
//! while the observer runs is seen when the observer returns, so slow
//! observers delay both boundary checks and stop acknowledgement. Utterances
//! of a stopped run that are still queued are discarded, but one that is
//! already being spoken plays to the end.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};

use super::boundary;
use super::clock::{Clock, StopSignal, SystemClock, Wake};
use super::guard::CountdownGuard;
use crate::announce::{Announcement, AnnouncementQueue, Announcer};
use crate::error::{ClockError, CountdownError, ErrorLog, Result};
use crate::events::CountdownEvent;
use crate::storage::Config;

/// Per-second callback, invoked on the timing-loop thread.
pub type Observer = Box<dyn FnMut(u32) + Send + 'static>;

/// How the most recent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Stopped,
    /// The clock failed or the observer panicked.
    Failed,
}

/// Tunables for one engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How long `stop` waits for the timing loop to exit.
    pub stop_timeout: Duration,
    /// Announcements that may wait behind the one being spoken.
    pub queue_capacity: usize,
    /// Spoken when a run reaches zero.
    pub completion_phrase: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_millis(1000),
            queue_capacity: 16,
            completion_phrase: "Countdown complete!".into(),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            stop_timeout: Duration::from_millis(config.countdown.stop_timeout_ms),
            queue_capacity: config.countdown.queue_capacity,
            completion_phrase: config.announcer.completion_phrase.clone(),
        }
    }
}

#[derive(Debug)]
struct RunState {
    running: bool,
    current_count: u32,
    end_time: Option<DateTime<Utc>>,
    run_id: u64,
    /// The loop has committed to the terminal sequence; stop no longer wins.
    completing: bool,
    outcome: Option<RunOutcome>,
    loop_thread: Option<ThreadId>,
    stop: Arc<StopSignal>,
    muted: Arc<AtomicBool>,
}

impl RunState {
    fn is_live(&self, run_id: u64) -> bool {
        self.running && self.run_id == run_id
    }
}

struct Shared {
    state: Mutex<RunState>,
    clock: Arc<dyn Clock>,
    queue: Mutex<AnnouncementQueue>,
    errors: Arc<ErrorLog>,
    completion_phrase: String,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, state: &RunState, text: impl Into<String>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .enqueue(Announcement::new(text, Arc::clone(&state.muted)));
    }

    /// Flip a live run to stopped. Returns the event when this call ended it.
    fn request_stop(&self) -> (Option<CountdownEvent>, bool) {
        let mut state = self.lock_state();
        state.stop.stop();
        let on_loop_thread = state.loop_thread == Some(thread::current().id());
        if !state.running || state.completing {
            return (None, on_loop_thread);
        }
        state.running = false;
        state.outcome = Some(RunOutcome::Stopped);
        state.muted.store(true, Ordering::SeqCst);
        tracing::info!(count = state.current_count, "countdown stopped");
        let event = CountdownEvent::Stopped {
            count: state.current_count,
            at: Utc::now(),
        };
        (Some(event), on_loop_thread)
    }
}

struct LoopHandle {
    thread: JoinHandle<()>,
    /// Disconnects when the loop thread has finished its run.
    done: Receiver<()>,
}

impl LoopHandle {
    fn has_exited(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Spoken countdown over a fixed number of seconds.
///
/// All methods take `&self`; the engine can be shared across threads.
pub struct CountdownEngine {
    shared: Arc<Shared>,
    loop_handle: Mutex<Option<LoopHandle>>,
    stop_timeout: Duration,
}

impl CountdownEngine {
    /// Engine on the system clock with default options.
    ///
    /// # Errors
    ///
    /// Returns [`CountdownError::Io`] if the announcer thread cannot be spawned.
    pub fn new(announcer: impl Announcer) -> Result<Self> {
        Self::with_options(announcer, Arc::new(SystemClock), EngineOptions::default())
    }

    /// Engine with an explicit clock and options.
    ///
    /// # Errors
    ///
    /// Returns [`CountdownError::Io`] if the announcer thread cannot be spawned.
    pub fn with_options(
        announcer: impl Announcer,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Result<Self> {
        let errors = Arc::new(ErrorLog::default());
        let queue = AnnouncementQueue::spawn(announcer, options.queue_capacity, Arc::clone(&errors))?;
        let state = RunState {
            running: false,
            current_count: 0,
            end_time: None,
            run_id: 0,
            completing: false,
            outcome: None,
            loop_thread: None,
            stop: Arc::new(StopSignal::new()),
            muted: Arc::new(AtomicBool::new(false)),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                clock,
                queue: Mutex::new(queue),
                errors,
                completion_phrase: options.completion_phrase,
            }),
            loop_handle: Mutex::new(None),
            stop_timeout: options.stop_timeout,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    pub fn current_count(&self) -> u32 {
        self.shared.lock_state().current_count
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.shared.lock_state().end_time
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.shared.lock_state().outcome
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> CountdownEvent {
        let state = self.shared.lock_state();
        CountdownEvent::StateSnapshot {
            running: state.running,
            current_count: state.current_count,
            end_time: state.end_time,
            outcome: state.outcome,
            at: Utc::now(),
        }
    }

    /// Drain failures reported by the timing loop and the announcer worker.
    pub fn take_errors(&self) -> Vec<CountdownError> {
        self.shared.errors.drain()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a countdown without an observer.
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub fn start(&self, seconds: u32) -> Result<CountdownEvent> {
        self.start_inner(seconds, None)
    }

    /// Start a countdown of `seconds`, calling `observer` with every count
    /// from `seconds` down to 0 on the timing-loop thread.
    ///
    /// The announcement of the initial count is queued before this returns;
    /// the call never waits for the countdown itself.
    ///
    /// # Errors
    ///
    /// - [`CountdownError::InvalidDuration`] if `seconds` is 0
    /// - [`CountdownError::AlreadyRunning`] if a run or its loop thread is
    ///   still active
    /// - [`CountdownError::Clock`] if the current time cannot be read
    /// - [`CountdownError::Io`] if the loop thread cannot be spawned
    pub fn start_with<F>(&self, seconds: u32, observer: F) -> Result<CountdownEvent>
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.start_inner(seconds, Some(Box::new(observer)))
    }

    /// Stop the current run. Idempotent and safe to call from the observer.
    ///
    /// Waits up to the configured stop timeout for the loop to exit; on
    /// timeout a [`CountdownError::TimeoutOnStop`] is recorded and the loop,
    /// already cancelled, finishes on its own. Returns the `Stopped` event
    /// when this call ended a live run.
    pub fn stop(&self) -> Option<CountdownEvent> {
        let (event, on_loop_thread) = self.shared.request_stop();
        if on_loop_thread {
            return event;
        }

        let mut slot = self.lock_handle();
        let Some(handle) = slot.take() else {
            return event;
        };
        if handle.thread.thread().id() == thread::current().id() {
            *slot = Some(handle);
            return event;
        }
        match handle.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => join_loop(handle),
            Err(RecvTimeoutError::Timeout) => {
                let waited_ms = u64::try_from(self.stop_timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(waited_ms, "timing loop did not acknowledge stop in time");
                self.shared
                    .errors
                    .push(CountdownError::TimeoutOnStop { waited_ms });
                *slot = Some(handle);
            }
        }
        event
    }

    /// Block until the current run's loop thread has exited.
    pub fn wait(&self) {
        if let Some(done) = self.done_receiver() {
            let _ = done.recv();
        }
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns `true` once no
    /// loop is active.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.done_receiver() {
            Some(done) => !matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)),
            None => true,
        }
    }

    /// Scoped acquisition: the returned guard stops the engine when dropped.
    pub fn scoped(&self) -> CountdownGuard<'_> {
        CountdownGuard::new(self)
    }

    /// Stop, let the announcer finish every queued utterance, and return the
    /// errors collected along the way.
    pub fn shutdown(self) -> Vec<CountdownError> {
        self.close();
        self.take_errors()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn start_inner(&self, seconds: u32, observer: Option<Observer>) -> Result<CountdownEvent> {
        if seconds == 0 {
            return Err(CountdownError::InvalidDuration { seconds });
        }

        let mut slot = self.lock_handle();
        if let Some(handle) = slot.take() {
            if !handle.has_exited() {
                *slot = Some(handle);
                return Err(CountdownError::AlreadyRunning);
            }
            join_loop(handle);
        }

        let now = self.shared.clock.now()?;
        let end_time = now
            .checked_add_signed(TimeDelta::seconds(i64::from(seconds)))
            .ok_or(ClockError::OutOfRange)?;

        let run = {
            let mut state = self.shared.lock_state();
            if state.running {
                return Err(CountdownError::AlreadyRunning);
            }
            state.run_id += 1;
            state.running = true;
            state.current_count = seconds;
            state.end_time = Some(end_time);
            state.completing = false;
            state.outcome = None;
            state.loop_thread = None;
            state.stop = Arc::new(StopSignal::new());
            state.muted = Arc::new(AtomicBool::new(false));
            self.shared.announce(&state, seconds.to_string());
            Run {
                id: state.run_id,
                seconds,
                end_time,
                stop: Arc::clone(&state.stop),
            }
        };

        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("saycount-timer".into())
            .spawn(move || {
                let _done = done_tx;
                run_loop(&shared, &run, observer);
            });
        match spawned {
            Ok(thread) => *slot = Some(LoopHandle { thread, done }),
            Err(err) => {
                let mut state = self.shared.lock_state();
                state.running = false;
                state.outcome = Some(RunOutcome::Failed);
                state.muted.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        }

        tracing::info!(seconds, %end_time, "countdown started");
        Ok(CountdownEvent::Started {
            seconds,
            end_time,
            at: Utc::now(),
        })
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<LoopHandle>> {
        self.loop_handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn done_receiver(&self) -> Option<Receiver<()>> {
        if self.shared.lock_state().loop_thread == Some(thread::current().id()) {
            return None;
        }
        self.lock_handle().as_ref().map(|handle| handle.done.clone())
    }

    fn close(&self) {
        self.stop();
        if let Some(handle) = self.lock_handle().take() {
            if handle.thread.thread().id() != thread::current().id() {
                join_loop(handle);
            }
        }
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown();
    }
}

impl Drop for CountdownEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CountdownEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("CountdownEngine")
            .field("running", &state.running)
            .field("current_count", &state.current_count)
            .field("end_time", &state.end_time)
            .field("outcome", &state.outcome)
            .finish_non_exhaustive()
    }
}

fn join_loop(handle: LoopHandle) {
    if handle.thread.join().is_err() {
        tracing::error!("timing loop thread panicked");
    }
}

/// Immutable facts about one run, owned by its loop thread.
struct Run {
    id: u64,
    seconds: u32,
    end_time: DateTime<Utc>,
    stop: Arc<StopSignal>,
}

enum Finish {
    Completed,
    Stopped,
}

/// Marks the run finished if the loop leaves without doing so (panic).
struct LoopExit<'a> {
    shared: &'a Shared,
    run_id: u64,
}

impl Drop for LoopExit<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        if state.run_id != self.run_id {
            return;
        }
        state.loop_thread = None;
        if state.running {
            if thread::panicking() {
                tracing::error!("observer panicked; abandoning countdown");
            }
            state.running = false;
            state.outcome = Some(RunOutcome::Failed);
            state.muted.store(true, Ordering::SeqCst);
        }
    }
}

fn run_loop(shared: &Shared, run: &Run, mut observer: Option<Observer>) {
    {
        let mut state = shared.lock_state();
        if state.run_id == run.id {
            state.loop_thread = Some(thread::current().id());
        }
    }
    let _exit = LoopExit {
        shared,
        run_id: run.id,
    };

    match count_down(shared, run, &mut observer) {
        Ok(Finish::Completed) => complete(shared, run, &mut observer),
        Ok(Finish::Stopped) => tracing::debug!("timing loop exiting after stop"),
        Err(err) => {
            tracing::error!(error = %err, "clock failed; abandoning countdown");
            let mut state = shared.lock_state();
            if state.is_live(run.id) {
                state.running = false;
                state.outcome = Some(RunOutcome::Failed);
                state.muted.store(true, Ordering::SeqCst);
            }
            shared.errors.push(err);
        }
    }
}

fn notify(observer: &mut Option<Observer>, count: u32) {
    if let Some(observer) = observer.as_mut() {
        observer(count);
    }
}

/// Sleep from boundary to boundary until the count reaches zero.
fn count_down(
    shared: &Shared,
    run: &Run,
    observer: &mut Option<Observer>,
) -> Result<Finish, ClockError> {
    if !shared.lock_state().is_live(run.id) {
        return Ok(Finish::Stopped);
    }
    notify(observer, run.seconds);

    let mut current = run.seconds;
    while current > 0 {
        if run.stop.is_stopped() {
            return Ok(Finish::Stopped);
        }
        let remaining = run.end_time - shared.clock.now()?;
        let Some(nap) = boundary::next_nap(remaining) else {
            break;
        };
        tracing::trace!(?nap, "sleeping until next boundary");
        if shared.clock.sleep(nap, &run.stop) == Wake::Stopped {
            return Ok(Finish::Stopped);
        }

        let count = boundary::count_at(run.end_time - shared.clock.now()?);
        if count == 0 {
            break;
        }
        if count < current {
            if current - count > 1 {
                tracing::debug!(from = current, to = count, "overshoot; skipping counts");
            }
            current = count;
            {
                let mut state = shared.lock_state();
                if !state.is_live(run.id) {
                    return Ok(Finish::Stopped);
                }
                state.current_count = count;
                shared.announce(&state, count.to_string());
            }
            tracing::debug!(count, "tick");
            notify(observer, count);
        }
    }
    Ok(Finish::Completed)
}

/// Terminal sequence: count 0, completion phrase and `observer(0)`, once.
fn complete(shared: &Shared, run: &Run, observer: &mut Option<Observer>) {
    {
        let mut state = shared.lock_state();
        if !state.is_live(run.id) {
            return;
        }
        state.current_count = 0;
        state.completing = true;
        shared.announce(&state, shared.completion_phrase.as_str());
    }
    notify(observer, 0);
    {
        let mut state = shared.lock_state();
        if state.run_id == run.id {
            state.running = false;
            state.completing = false;
            state.outcome = Some(RunOutcome::Completed);
        }
    }
    tracing::info!("countdown complete");
}
