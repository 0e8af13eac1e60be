pub mod boundary;
mod clock;
mod engine;
mod guard;

pub use clock::{Clock, ManualClock, StopSignal, SystemClock, Wake};
pub use engine::{CountdownEngine, EngineOptions, Observer, RunOutcome};
pub use guard::CountdownGuard;
