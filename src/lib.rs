//! Rust client SDK for the vessel daemon event stream.
//!
//! The vessel daemon pushes its state changes (search replies, download
//! lifecycle, room lists, chat) over a server-sent-event endpoint. This crate
//! keeps that connection alive, decodes the named JSON events, and fans them
//! out into independently observable stores:
//!
//! - `events::client`: SSE connection with automatic reconnection.
//! - `events::proto`: typed events and payloads.
//! - `events::stores`: reactive per-concern stores with ticket correlation.
//! - `store`: the observable value primitive the stores are built on.
//! - `backoff`: reconnect delay policy.

/// Reconnect delay policy.
pub mod backoff;
/// Event stream client, protocol types, framing, and stores.
pub mod events;
/// Observable value container.
pub mod store;
