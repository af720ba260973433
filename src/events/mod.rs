//! Event stream modules.
//!
//! - `client`: SSE transport, background worker, and reconnect handling.
//! - `proto`: event names and payload types shared with the daemon.
//! - `sse`: text/event-stream framing decoder.
//! - `stores`: event router and per-concern reactive stores.

/// Event stream connection and worker.
pub mod client;
/// Daemon event names and payloads.
pub mod proto;
/// SSE wire framing.
pub mod sse;
/// Event router and reactive stores.
pub mod stores;
