//! Connection implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Connection` trait. The in-memory broker is always available and defines
//! the reference semantics; broker-backed connections are hidden behind
//! feature flags and exposed only through constructor functions.
//!
//! Endpoint code must not depend on backend-specific types.

mod memory;

#[cfg(feature = "nats")]
mod nats;

pub use memory::MemoryBroker;

#[cfg(feature = "nats")]
pub use nats::connect as connect_nats;
