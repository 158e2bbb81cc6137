//! Domain abstractions shared by the endpoint and the connection backends.
//!
//! This module defines the message data model and the connection interface
//! the endpoint is written against. It intentionally avoids any reference
//! to concrete brokers or client libraries; concrete implementations live
//! under `src/connection/`.

mod connection;

pub use connection::{
    // ---
    Connection,
    ConnectionPtr,
    Message,
    ReplyTarget,
    Subject,
    SubjectPattern,
    SubscriptionHandle,
};
