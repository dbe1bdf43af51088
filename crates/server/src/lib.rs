//! HTTP and WebSocket host for the deckbatch orchestrator.

pub mod api;
pub mod metrics;
pub mod state;
