//! Event logging for the tracking endpoint
//!
//! This module provides:
//! - Prediction and true value events
//! - A per-model log queue that is only cleared after a confirmed delivery
//! - The HTTP transport that POSTs event batches to `{base_url}/track`

mod buffer;
mod client;
mod event;


pub use buffer::{LogQueue, QueueStats};
pub use client::{EventTransport, HttpTransport, TransportConfig, DEFAULT_MODELFOX_URL};
pub use event::{
    Event, LogPredictionArgs, LogTrueValueArgs, PredictionEvent, TrueValueEvent,
};

use crate::error::{Error, Result};
use crate::model::Model;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// A snapshot of the log queue taken for one delivery.
///
/// Sending does not borrow the model, so the model can keep serving
/// predictions and queueing events while the request is in flight.
pub struct PendingFlush {
    events: Vec<Event>,
    transport: Arc<dyn EventTransport>,
}

impl PendingFlush {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Send the snapshot in one request
    pub async fn send(&self) -> Result<()> {
        self.transport.send(&self.events).await
    }
}

impl Model {
    fn prediction_event(&self, args: LogPredictionArgs) -> Event {
        Event::prediction(self.native.id(), args, Utc::now())
    }

    fn true_value_event(&self, args: LogTrueValueArgs) -> Event {
        Event::true_value(self.native.id(), args, Utc::now())
    }

    /// Send a prediction event immediately, without touching the queue
    pub async fn log_prediction(&self, args: LogPredictionArgs) -> Result<()> {
        let event = self.prediction_event(args);
        self.transport.send(std::slice::from_ref(&event)).await
    }

    /// Send a true value event immediately, without touching the queue
    pub async fn log_true_value(&self, args: LogTrueValueArgs) -> Result<()> {
        let event = self.true_value_event(args);
        self.transport.send(std::slice::from_ref(&event)).await
    }

    /// Queue a prediction event for the next flush
    pub fn enqueue_log_prediction(&mut self, args: LogPredictionArgs) {
        let event = self.prediction_event(args);
        self.log_queue.push(event);
        self.metrics.add_queued_events(1);
    }

    /// Queue a true value event for the next flush
    pub fn enqueue_log_true_value(&mut self, args: LogTrueValueArgs) {
        let event = self.true_value_event(args);
        self.log_queue.push(event);
        self.metrics.add_queued_events(1);
    }

    /// Send every queued event in one request.
    ///
    /// On success exactly the sent events are removed. On failure the queue is
    /// left unchanged so the flush can be retried.
    pub async fn flush_log_queue(&mut self) -> Result<()> {
        let Some(flush) = self.begin_flush() else {
            return Ok(());
        };
        let result = flush.send().await;
        self.finish_flush(flush, result)
    }

    /// Snapshot the queued events for delivery, or `None` if the queue is empty.
    ///
    /// Only one flush per model may be in progress: events queued after the
    /// snapshot stay behind it, and [`Model::finish_flush`] removes exactly the
    /// snapshotted prefix.
    pub fn begin_flush(&self) -> Option<PendingFlush> {
        if self.log_queue.is_empty() {
            debug!("Log queue is empty, nothing to flush");
            return None;
        }
        Some(PendingFlush {
            events: self.log_queue.peek().to_vec(),
            transport: self.transport.clone(),
        })
    }

    /// Apply the outcome of sending `flush`.
    ///
    /// On success the sent events are removed from the front of the queue. On
    /// failure the queue is left unchanged and the error is returned.
    pub fn finish_flush(&mut self, flush: PendingFlush, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                let sent = self.log_queue.remove_sent(flush.len());
                self.metrics.inc_events_flushed(sent);
                self.metrics.sub_queued_events(sent);
                self.logger.log_flush(sent, self.log_queue.len());
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_flush_failures();
                let status = match &e {
                    Error::LogTransportFailed { status, .. } => *status,
                    _ => None,
                };
                self.logger
                    .log_flush_failed(self.log_queue.len(), status, &e.to_string());
                Err(e)
            }
        }
    }

    pub fn log_queue(&self) -> &LogQueue {
        &self.log_queue
    }
}
