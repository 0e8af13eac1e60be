//! Bounded announcement queue with a single speaking worker.
//!
//! The worker thread owns the announcer, so utterances are spoken one at a
//! time in submission order. Producers never block: a full or closed queue
//! drops the utterance and records the failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::Announcer;
use crate::error::{AnnouncerError, ErrorLog, Result};

/// One utterance, tied to the mute flag of the run that produced it.
#[derive(Debug, Clone)]
pub struct Announcement {
    text: String,
    muted: Arc<AtomicBool>,
}

impl Announcement {
    pub fn new(text: impl Into<String>, muted: Arc<AtomicBool>) -> Self {
        Self {
            text: text.into(),
            muted,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A muted announcement is discarded if it has not started speaking yet.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct AnnouncementQueue {
    tx: Option<Sender<Announcement>>,
    worker: Option<JoinHandle<()>>,
    errors: Arc<ErrorLog>,
}

impl AnnouncementQueue {
    /// Start the worker thread. `capacity` is clamped to at least 1.
    pub(crate) fn spawn<A: Announcer>(
        announcer: A,
        capacity: usize,
        errors: Arc<ErrorLog>,
    ) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        let worker_errors = Arc::clone(&errors);
        let worker = thread::Builder::new()
            .name("saycount-announcer".into())
            .spawn(move || speak_all(announcer, rx, &worker_errors))?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            errors,
        })
    }

    /// Hand an announcement to the worker without waiting.
    pub fn enqueue(&self, announcement: Announcement) {
        let Some(tx) = &self.tx else {
            self.reject(AnnouncerError::QueueClosed {
                utterance: announcement.text,
            });
            return;
        };
        match tx.try_send(announcement) {
            Ok(()) => {}
            Err(TrySendError::Full(announcement)) => self.reject(AnnouncerError::QueueFull {
                utterance: announcement.text,
            }),
            Err(TrySendError::Disconnected(announcement)) => {
                self.reject(AnnouncerError::QueueClosed {
                    utterance: announcement.text,
                })
            }
        }
    }

    /// Number of announcements waiting to be spoken.
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, Sender::len)
    }

    /// Close the queue and wait for the worker to drain it.
    pub fn shutdown(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("announcer worker panicked");
            }
        }
    }

    fn reject(&self, err: AnnouncerError) {
        tracing::warn!(error = %err, "announcement dropped");
        self.errors.push(err);
    }
}

impl Drop for AnnouncementQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn speak_all<A: Announcer>(mut announcer: A, rx: Receiver<Announcement>, errors: &ErrorLog) {
    for announcement in rx {
        if announcement.is_muted() {
            tracing::debug!(utterance = announcement.text(), "skipping muted announcement");
            continue;
        }
        if let Err(err) = announcer.speak(announcement.text()) {
            tracing::warn!(utterance = announcement.text(), error = %err, "announcer failed");
            errors.push(err);
        }
    }
}
