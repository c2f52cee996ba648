//! ModelFox serving sidecar
//!
//! Serves predictions from one model over HTTP, queues prediction and true value
//! events, and flushes them to the app in the background.

pub mod api;
pub mod config;
pub mod health;
pub mod worker;
