//! Announcers turn short utterances into speech.
//!
//! The engine never talks to an announcer directly; every utterance goes
//! through the [`AnnouncementQueue`], whose single worker thread owns the
//! announcer and speaks one utterance at a time.

mod command;
mod queue;

pub use command::{CommandAnnouncer, SpeechFlavor};
pub use queue::{Announcement, AnnouncementQueue};

use crate::error::AnnouncerError;

/// Renders an utterance to audio, blocking until playback finishes or fails.
pub trait Announcer: Send + 'static {
    fn speak(&mut self, utterance: &str) -> Result<(), AnnouncerError>;
}

impl<A: Announcer + ?Sized> Announcer for Box<A> {
    fn speak(&mut self, utterance: &str) -> Result<(), AnnouncerError> {
        (**self).speak(utterance)
    }
}

/// Silent announcer: logs each utterance instead of speaking it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn speak(&mut self, utterance: &str) -> Result<(), AnnouncerError> {
        tracing::info!(utterance, "announce");
        Ok(())
    }
}
