// src/domain/connection.rs

//! Connection domain abstractions.
//!
//! This module defines the domain-level connection interface the endpoint
//! uses to receive and send messages. It intentionally avoids any reference
//! to concrete protocols, brokers, or client libraries.
//!
//! The connection layer is responsible only for delivering messages to
//! subscribed consumers and for draining/closing cleanly. Higher-level
//! semantics such as request-reply correlation and dispatch-loop resilience
//! are handled by the endpoint layer.
//!
//! Concrete implementations of this interface live under `src/connection/`.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// A concrete message subject.
///
/// A `Subject` is a dot-delimited hierarchical topic name used for routing
/// (e.g. `user.created`). Subjects are immutable, cheap to clone, and safe
/// to share across tasks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Subject(pub Arc<str>);

impl Subject {
    /// Returns the subject as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Subject
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Subject(value.into())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subject pattern selecting a set of concrete subjects.
///
/// A pattern is a subject string possibly containing wildcard segments:
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
/// A pattern is resolved once at subscribe time into a persistent
/// registration with the broker; it is not re-evaluated per message by
/// the endpoint.
///
/// The in-memory connection provides the reference matching semantics
/// (see [`SubjectPattern::matches`]). Broker-backed connections delegate
/// matching to the broker itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubjectPattern(pub Arc<str>);

impl SubjectPattern {
    /// Returns the pattern as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference matching semantics: token-wise comparison where `*`
    /// matches exactly one token and a trailing `>` matches one or more
    /// remaining tokens.
    pub fn matches(&self, subject: &Subject) -> bool {
        // ---
        let mut pattern = self.0.split('.');
        let mut tokens = subject.0.split('.');

        loop {
            match (pattern.next(), tokens.next()) {
                // `>` requires at least one remaining token
                (Some(">"), Some(_)) => return true,
                (Some(">"), None) => return false,
                (Some("*"), Some(_)) => {}
                (Some(p), Some(t)) if p == t => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl<T> From<T> for SubjectPattern
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        SubjectPattern(value.into())
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque, single-use reply destination.
///
/// A `ReplyTarget` is supplied by the broker on messages sent under the
/// request-reply convention. Sending via the target transmits a payload
/// directly to the original requester.
///
/// The target belongs to the [`Message`] that carries it and should be
/// used at most once: sending twice is not an error at this layer, but
/// only the first reply is meaningful to a requester waiting on a single
/// response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget(Subject);

impl ReplyTarget {
    /// Create a reply target for the given subject.
    ///
    /// Normally only connection backends construct reply targets; they are
    /// attached to inbound messages when the sender used the request-reply
    /// convention.
    pub fn new(subject: Subject) -> Self {
        ReplyTarget(subject)
    }

    /// The subject replies are delivered to.
    pub fn subject(&self) -> &Subject {
        &self.0
    }
}

/// An inbound message delivered on a subscription.
///
/// `reply` is present iff the sender used the request-reply convention;
/// absence means fire-and-forget and no response must be sent.
#[derive(Clone, Debug)]
pub struct Message {
    /// Concrete subject the message was published on.
    pub subject: Subject,

    /// Opaque payload bytes. The endpoint decodes these with a fixed
    /// UTF-8 text codec; the connection layer does not interpret them.
    pub payload: Bytes,

    /// Reply destination, present only for request-reply messages.
    pub reply: Option<ReplyTarget>,
}

/// Handle returned from a successful subscription.
///
/// Messages arrive on `inbox` in broker delivery order for this
/// subscription; no ordering is guaranteed across different subscriptions.
/// The stream ends (`recv()` returns `None`) when the connection drains or
/// closes, or when the registration is severed on the broker side. A
/// subscription is restartable only by recreating it.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for messages matching this subscription.
    pub inbox: mpsc::Receiver<Message>,
}

/// Connection abstraction.
///
/// A `Connection` is the single shared handle to the broker. It must
/// support concurrent use by multiple dispatchers: `publish` and `respond`
/// are safe to call from any number of tasks at once.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after*
///   that point and matching the pattern are deliverable.
/// - `drain()` stops intake on this connection's subscriptions while
///   leaving already-delivered messages readable and outbound sends
///   working, so in-flight request-reply cycles can complete.
/// - Reconnection, if any, is the connection's own responsibility; the
///   endpoint never re-creates subscriptions behind a live dispatcher.
///
/// The in-memory connection serves as the reference implementation of
/// these semantics.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    // ---
    /// Register a subscription for a subject pattern and return a handle
    /// for receiving matching messages.
    async fn subscribe(&self, pattern: SubjectPattern) -> Result<SubscriptionHandle>;

    /// Publish a payload to a concrete subject.
    async fn publish(&self, subject: Subject, payload: Bytes) -> Result<()>;

    /// Send a payload to a reply target.
    ///
    /// Default implementation delegates to [`publish`](Connection::publish);
    /// the target is an ordinary subject from the connection's point of view.
    async fn respond(&self, reply: &ReplyTarget, payload: Bytes) -> Result<()> {
        self.publish(reply.subject().clone(), payload).await
    }

    /// Resolves once the connection has terminated.
    ///
    /// Returns `None` for a graceful closure and `Some(reason)` when the
    /// connection was closed by an error.
    async fn closed(&self) -> Option<String>;

    /// Stop accepting new inbound messages on all of this connection's
    /// subscriptions. Completes when intake has stopped; messages already
    /// delivered remain readable from their subscription handles.
    async fn drain(&self) -> Result<()>;

    /// Release the connection. Implies `drain()` if it has not run yet.
    async fn close(&self) -> Result<()>;
}

/// Shared connection pointer.
///
/// This is an `Arc<dyn Connection>`: `.clone()` is cheap, all clones share
/// the same underlying connection, and the concrete backend is erased
/// behind the domain interface.
pub type ConnectionPtr = Arc<dyn Connection>;
