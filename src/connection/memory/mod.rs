// src/connection/memory/mod.rs

//! In-memory connection implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Connection` trait. It is intended primarily for testing, local execution,
//! and as a reference for connection semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory broker defines the **reference behavior** for the connection
//! layer. Broker-backed connections are expected to approximate this behavior
//! as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! In particular, the in-memory broker establishes the following expectations:
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point and matching the pattern are deliverable.
//! - Within one subscription, messages are delivered in publish order.
//! - `drain()` affects only the draining connection's subscriptions; other
//!   connections on the same broker keep receiving messages, and outbound
//!   publishes from the draining connection still work so in-flight replies
//!   can be sent.
//!
//! ## Non-Goals
//!
//! This broker does not attempt to emulate the failure modes, persistence,
//! or delivery guarantees of any specific broker. It exists to provide a
//! clear, deterministic baseline against which endpoint behavior can be
//! validated. The one concession to failure testing is
//! [`MemoryBroker::sever`], which simulates a terminal stream failure on a
//! single subscription.

mod broker;

pub use broker::MemoryBroker;
