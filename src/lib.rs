//! Message-bus endpoint with subscription dispatch and request-reply
//!
//! This library connects to a publish/subscribe broker, maintains
//! long-lived subscriptions on a set of hierarchical subject patterns, and
//! serves a request-reply convention on top of plain pub/sub messages:
//! every inbound message carrying a reply target receives exactly one
//! response, success or error, and a failure while handling one message
//! never terminates the dispatch loop.
//!

// Import all sub modules once...
mod config;
mod connection;
mod domain;
mod endpoint;

mod error;
mod retry;
mod sync;

// Re-export main types
pub use endpoint::{Endpoint, State};

pub use config::{EndpointConfig, SubjectSpec};

pub use error::{Error, Result};
pub use retry::RetryConfig;

pub use connection::MemoryBroker;

#[cfg(feature = "nats")]
pub use connection::connect_nats;

// --- public re-exports
pub use domain::{
    //
    Connection,
    ConnectionPtr,
    Message,
    ReplyTarget,
    Subject,
    SubjectPattern,
    SubscriptionHandle,
};
