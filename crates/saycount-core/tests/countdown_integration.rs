//! Integration tests for the countdown engine on the system clock.
//!
//! These runs take real seconds; durations are kept short.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use saycount_core::{
    Announcer, AnnouncerError, Config, CountdownEngine, CountdownError, CountdownEvent,
    EngineOptions, LogAnnouncer, RunOutcome, SystemClock,
};

#[derive(Clone, Default)]
struct Recorder {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl Announcer for Recorder {
    fn speak(&mut self, utterance: &str) -> Result<(), AnnouncerError> {
        self.spoken.lock().unwrap().push(utterance.to_string());
        Ok(())
    }
}

fn observed(engine: &CountdownEngine, seconds: u32) -> Arc<Mutex<Vec<(u32, Instant)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine
        .start_with(seconds, move |count| {
            sink.lock().unwrap().push((count, Instant::now()));
        })
        .unwrap();
    seen
}

#[test]
fn test_three_second_countdown_completes() {
    let recorder = Recorder::default();
    let engine = CountdownEngine::new(recorder.clone()).unwrap();
    let started = Instant::now();
    let seen = observed(&engine, 3);
    assert!(engine.is_running());
    assert!(engine.wait_timeout(Duration::from_secs(5)));

    let seen = seen.lock().unwrap();
    let counts: Vec<u32> = seen.iter().map(|(count, _)| *count).collect();
    assert_eq!(counts, vec![3, 2, 1, 0]);
    assert!(!engine.is_running());
    assert_eq!(engine.outcome(), Some(RunOutcome::Completed));

    let elapsed = seen.last().unwrap().1 - started;
    assert!(elapsed >= Duration::from_millis(2_900), "finished early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(3_500), "finished late: {elapsed:?}");

    assert!(engine.shutdown().is_empty());
    assert_eq!(
        *recorder.spoken.lock().unwrap(),
        vec!["3", "2", "1", "Countdown complete!"]
    );
}

#[test]
fn test_stop_mid_run_is_prompt_and_skips_completion() {
    let recorder = Recorder::default();
    let engine = CountdownEngine::new(recorder.clone()).unwrap();
    let seen = observed(&engine, 5);

    std::thread::sleep(Duration::from_millis(2_200));
    let stop_at = Instant::now();
    let event = engine.stop();
    assert!(stop_at.elapsed() <= Duration::from_millis(100));
    assert!(matches!(event, Some(CountdownEvent::Stopped { .. })));
    assert!(!engine.is_running());
    assert_eq!(engine.outcome(), Some(RunOutcome::Stopped));

    let counts: Vec<u32> = seen.lock().unwrap().iter().map(|(count, _)| *count).collect();
    assert!(counts.starts_with(&[5, 4, 3]), "unexpected counts {counts:?}");
    assert!(counts.len() <= 4);
    assert!(!counts.contains(&0));

    engine.shutdown();
    assert!(!recorder
        .spoken
        .lock()
        .unwrap()
        .contains(&"Countdown complete!".to_string()));
}

#[test]
fn test_stop_is_idempotent() {
    let engine = CountdownEngine::new(LogAnnouncer).unwrap();
    assert!(engine.stop().is_none());
    engine.start(10).unwrap();
    assert!(engine.stop().is_some());
    assert!(engine.stop().is_none());
    assert!(engine.stop().is_none());
    assert_eq!(engine.outcome(), Some(RunOutcome::Stopped));
    assert!(engine.take_errors().is_empty());
}

#[test]
fn test_zero_duration_rejected() {
    let engine = CountdownEngine::new(LogAnnouncer).unwrap();
    let err = engine.start(0).unwrap_err();
    assert!(matches!(err, CountdownError::InvalidDuration { seconds: 0 }));
    assert!(!engine.is_running());
}

#[test]
fn test_second_start_rejected_while_running() {
    let engine = CountdownEngine::new(LogAnnouncer).unwrap();
    let first = engine.start(4).unwrap();
    let end_time = engine.end_time();
    let err = engine.start(2).unwrap_err();
    assert!(matches!(err, CountdownError::AlreadyRunning));

    // The first run is untouched.
    assert!(engine.is_running());
    assert_eq!(engine.end_time(), end_time);
    assert!(matches!(first, CountdownEvent::Started { seconds: 4, .. }));
    engine.stop();
}

#[test]
fn test_scoped_guard_stops_on_scope_exit() {
    let engine = CountdownEngine::new(LogAnnouncer).unwrap();
    {
        let countdown = engine.scoped();
        countdown.start(30).unwrap();
        assert!(countdown.is_running());
    }
    assert!(!engine.is_running());
    assert_eq!(engine.outcome(), Some(RunOutcome::Stopped));
}

#[test]
fn test_engine_options_from_config() {
    let mut config = Config::default();
    config.countdown.stop_timeout_ms = 250;
    config.announcer.completion_phrase = "Liftoff".into();

    let recorder = Recorder::default();
    let engine = CountdownEngine::with_options(
        recorder.clone(),
        Arc::new(SystemClock),
        EngineOptions::from(&config),
    )
    .unwrap();
    engine.start(1).unwrap();
    assert!(engine.wait_timeout(Duration::from_secs(3)));
    engine.shutdown();
    assert_eq!(*recorder.spoken.lock().unwrap(), vec!["1", "Liftoff"]);
}
