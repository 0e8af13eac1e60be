//! # Saycount Core Library
//!
//! This library provides the core logic for saycount, a precision countdown
//! that speaks every remaining second aloud. The CLI binary is a thin layer
//! over the same engine.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A timing-loop thread that sleeps from whole-second
//!   boundary to boundary, anchored to a fixed end time so drift never
//!   accumulates
//! - **Announcers**: Text-to-speech backends behind a trait, fed through a
//!   bounded queue on a dedicated worker thread
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`CountdownEngine`]: Countdown state machine
//! - [`CountdownGuard`]: Stops a countdown on every exit path of a scope
//! - [`Announcer`]: Trait for speech backends
//! - [`Config`]: Application configuration management

pub mod announce;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use announce::{Announcer, CommandAnnouncer, LogAnnouncer};
pub use error::{AnnouncerError, ClockError, ConfigError, CountdownError, Result};
pub use events::CountdownEvent;
pub use storage::Config;
pub use timer::{
    Clock, CountdownEngine, CountdownGuard, EngineOptions, ManualClock, RunOutcome, StopSignal,
    SystemClock,
};
