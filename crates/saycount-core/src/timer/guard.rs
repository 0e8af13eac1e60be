use std::ops::Deref;

use super::engine::CountdownEngine;

/// Stops the borrowed engine when it goes out of scope, on every exit path
/// including early `?` returns and panics.
#[derive(Debug)]
pub struct CountdownGuard<'a> {
    engine: &'a CountdownEngine,
}

impl<'a> CountdownGuard<'a> {
    pub(crate) fn new(engine: &'a CountdownEngine) -> Self {
        Self { engine }
    }
}

impl Deref for CountdownGuard<'_> {
    type Target = CountdownEngine;

    fn deref(&self) -> &CountdownEngine {
        self.engine
    }
}

impl Drop for CountdownGuard<'_> {
    fn drop(&mut self) {
        self.engine.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::announce::LogAnnouncer;
    use crate::error::CountdownError;
    use crate::timer::{CountdownEngine, RunOutcome};

    fn countdown_then_fail(engine: &CountdownEngine) -> Result<(), CountdownError> {
        let countdown = engine.scoped();
        countdown.start(30)?;
        countdown.start(30)?;
        Ok(())
    }

    #[test]
    fn guard_stops_the_engine_on_error_exit() {
        let engine = CountdownEngine::new(LogAnnouncer).unwrap();
        let err = countdown_then_fail(&engine).unwrap_err();
        assert!(matches!(err, CountdownError::AlreadyRunning));
        assert!(!engine.is_running());
        assert_eq!(engine.outcome(), Some(RunOutcome::Stopped));
    }

    #[test]
    fn guard_stops_the_engine_on_panic() {
        let engine = Arc::new(CountdownEngine::new(LogAnnouncer).unwrap());
        let inner = Arc::clone(&engine);
        let result = std::thread::spawn(move || {
            let countdown = inner.scoped();
            countdown.start(30).unwrap();
            panic!("caller failed mid-countdown");
        })
        .join();
        assert!(result.is_err());
        assert!(engine.wait_timeout(Duration::from_secs(2)));
        assert!(!engine.is_running());
        assert_eq!(engine.outcome(), Some(RunOutcome::Stopped));
    }
}
