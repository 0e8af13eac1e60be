//! Second-boundary arithmetic.
//!
//! Everything is derived from the time remaining until the run's fixed end
//! time, never from the previous wake-up, so sleep overshoot cannot compound
//! across a countdown.

use std::time::Duration;

use chrono::TimeDelta;

/// Extra time added to every nap so the wake lands just past the boundary,
/// where `floor(remaining)` has already changed.
pub const BOUNDARY_SLACK: Duration = Duration::from_millis(1);

/// Visible count for `remaining` time left: `floor(remaining) + 1`, or 0 once
/// the end time has been reached.
pub fn count_at(remaining: TimeDelta) -> u32 {
    match remaining.to_std() {
        Ok(left) if !left.is_zero() => u32::try_from(left.as_secs())
            .map(|secs| secs.saturating_add(1))
            .unwrap_or(u32::MAX),
        _ => 0,
    }
}

/// How long to sleep before the next boundary check.
///
/// That is the time until `remaining` drops below its current whole second,
/// plus [`BOUNDARY_SLACK`], capped at `remaining` itself so the final nap ends
/// on the end time. `None` once nothing remains.
pub fn next_nap(remaining: TimeDelta) -> Option<Duration> {
    let left = remaining.to_std().ok().filter(|left| !left.is_zero())?;
    let to_boundary = Duration::from_nanos(u64::from(left.subsec_nanos())) + BOUNDARY_SLACK;
    Some(to_boundary.min(left))
}
