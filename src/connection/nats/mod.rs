// src/connection/nats/mod.rs

//! NATS connection implementation.
//!
//! Adapts the `async-nats` client to the domain-level `Connection` trait.
//! Subject pattern matching is delegated to the NATS server; this module
//! only bridges subscriptions into the domain message type and maps the
//! drain/close lifecycle.
//!
//! ## Deviations from the reference semantics
//!
//! - `drain()` gracefully unsubscribes each subscription (pending messages
//!   are still delivered) but leaves the client connected so replies for
//!   in-flight messages can be published; the client itself is drained in
//!   `close()`.
//! - Connection closure is observed through the client event callback, so
//!   `closed()` resolves on broker-driven closure as well as local `close()`.

mod connection;

pub use connection::connect;
