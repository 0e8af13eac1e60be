use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::RunOutcome;

/// Every countdown state change produces an Event.
/// The CLI prints them as JSON lines in `--json` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountdownEvent {
    Started {
        seconds: u32,
        end_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A second boundary was crossed (or the initial count was shown).
    Tick {
        count: u32,
        at: DateTime<Utc>,
    },
    Completed {
        at: DateTime<Utc>,
    },
    /// The run was stopped before reaching zero.
    Stopped {
        count: u32,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        running: bool,
        current_count: u32,
        end_time: Option<DateTime<Utc>>,
        outcome: Option<RunOutcome>,
        at: DateTime<Utc>,
    },
}

impl CountdownEvent {
    pub fn tick(count: u32) -> Self {
        CountdownEvent::Tick {
            count,
            at: Utc::now(),
        }
    }

    pub fn completed() -> Self {
        CountdownEvent::Completed { at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_in_snake_case() {
        let json = serde_json::to_value(CountdownEvent::tick(3)).unwrap();
        assert_eq!(json["type"], "tick");
        assert_eq!(json["count"], 3);

        let snapshot = CountdownEvent::StateSnapshot {
            running: false,
            current_count: 0,
            end_time: None,
            outcome: Some(RunOutcome::Completed),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "state_snapshot");
        assert_eq!(json["outcome"], "completed");
    }
}
