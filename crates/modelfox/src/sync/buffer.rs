//! In-memory log queue
//!
//! Events are appended in order and only removed once the tracking endpoint has
//! confirmed them. A failed flush leaves the queue exactly as it was.

use super::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered queue of events waiting to be flushed
#[derive(Debug, Default)]
pub struct LogQueue {
    events: Vec<Event>,
}

/// Summary of the queued events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub predictions: usize,
    pub true_values: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl LogQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Queued events in append order
    pub fn peek(&self) -> &[Event] {
        &self.events
    }

    /// Remove the first `count` events after they were delivered, returning how
    /// many were removed
    pub(crate) fn remove_sent(&mut self, count: usize) -> usize {
        let count = count.min(self.events.len());
        self.events.drain(..count);
        count
    }

    pub fn stats(&self) -> QueueStats {
        let predictions = self.events.iter().filter(|e| e.is_prediction()).count();
        QueueStats {
            queued: self.events.len(),
            predictions,
            true_values: self.events.len() - predictions,
            oldest: self.events.iter().map(Event::date).min(),
            newest: self.events.iter().map(Event::date).max(),
        }
    }
}
