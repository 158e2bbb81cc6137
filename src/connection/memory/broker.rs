// src/connection/memory/broker.rs

//! In-memory broker and connection implementation.
//!
//! This file contains the concrete implementation of the domain-level
//! `Connection` trait using in-process data structures only. One
//! [`MemoryBroker`] plays the role of the broker; any number of connections
//! created through [`MemoryBroker::connect`] share its routing table, so a
//! requester and an endpoint can talk to each other within one process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, RwLock};

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    Connection,
    ConnectionPtr,
    Error,
    Message,
    ReplyTarget,
    Result,
    Subject,
    SubjectPattern,
    SubscriptionHandle,
};

/// Per-subscription delivery capacity. Publishes block (briefly) rather
/// than drop messages when a consumer lags behind.
const INBOX_CAPACITY: usize = 64;

/// One live registration in the routing table.
struct Registration {
    // ---
    /// Identifier of the connection that created this registration.
    /// Drain removes only the draining connection's registrations.
    owner: u64,

    tx: mpsc::Sender<Message>,
}

/// Shared routing table: subject pattern to the registrations it feeds.
struct Router {
    // ---
    subscriptions: RwLock<HashMap<SubjectPattern, Vec<Registration>>>,
}

impl Router {
    /// Deliver a message to every registration whose pattern matches.
    ///
    /// Matching uses the reference wildcard semantics defined by
    /// [`SubjectPattern::matches`]. Send failures are ignored; a closed
    /// channel indicates a dropped `SubscriptionHandle`.
    async fn deliver(&self, msg: Message) {
        // ---
        // Senders are cloned out so the lock is not held across sends;
        // a slow consumer must not stall a pending drain.
        let senders: Vec<mpsc::Sender<Message>> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|(pattern, _)| pattern.matches(&msg.subject))
                .flat_map(|(_, registrations)| registrations.iter().map(|r| r.tx.clone()))
                .collect()
        };

        for sender in senders {
            let _ = sender.send(msg.clone()).await;
        }
    }

    /// Register a new subscription for the given owner.
    async fn register(&self, owner: u64, pattern: SubjectPattern) -> SubscriptionHandle {
        // ---
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        subs.entry(pattern)
            .or_insert_with(Vec::new)
            .push(Registration { owner, tx });

        SubscriptionHandle { inbox: rx }
    }

    /// Remove every registration belonging to `owner`, dropping the
    /// senders so the corresponding inboxes end after any buffered
    /// messages are consumed.
    async fn remove_owner(&self, owner: u64) {
        // ---
        let mut subs = self.subscriptions.write().await;
        for registrations in subs.values_mut() {
            registrations.retain(|r| r.owner != owner);
        }
        subs.retain(|_, registrations| !registrations.is_empty());
    }

    /// Drop all registrations for one pattern, regardless of owner.
    async fn remove_pattern(&self, pattern: &SubjectPattern) {
        // ---
        let mut subs = self.subscriptions.write().await;
        subs.remove(pattern);
    }
}

/// In-process message broker.
///
/// Cloning is cheap; all clones share the same routing table. Create
/// connections with [`connect`](MemoryBroker::connect) and inject traffic
/// with [`publish`](MemoryBroker::publish) or
/// [`request`](MemoryBroker::request).
#[derive(Clone)]
pub struct MemoryBroker {
    // ---
    router: Arc<Router>,
    next_id: Arc<AtomicU64>,
}

impl MemoryBroker {
    /// Create a new broker with an empty routing table.
    pub fn new() -> Self {
        Self {
            router: Arc::new(Router {
                subscriptions: RwLock::new(HashMap::new()),
            }),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a connection to this broker.
    ///
    /// Connecting in-process cannot fail; the bounded-retry policy of the
    /// endpoint is exercised with broker-backed connections (or a failing
    /// connector in tests).
    pub fn connect(&self) -> ConnectionPtr {
        // ---
        let (closed_tx, closed_rx) = watch::channel(false);

        Arc::new(MemoryConnection {
            router: self.router.clone(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            draining: AtomicBool::new(false),
            closed_tx,
            closed_rx,
            close_reason: Mutex::new(None),
        })
    }

    /// Inject a message into the broker, optionally carrying a reply
    /// target. This is how a requester-side test or demo produces the
    /// request-reply convention without a client library.
    pub async fn publish(&self, subject: Subject, payload: Bytes, reply: Option<ReplyTarget>) {
        // ---
        self.router
            .deliver(Message {
                subject,
                payload,
                reply,
            })
            .await;
    }

    /// Send one request and await its single reply.
    ///
    /// Subscribes a unique single-use reply inbox, publishes the payload
    /// with a reply target pointing at it, and resolves with the reply
    /// payload. Fails with [`Error::ConnectionClosed`] if the inbox stream
    /// ends before a reply arrives.
    pub async fn request(&self, subject: Subject, payload: Bytes) -> Result<Bytes> {
        // ---
        let connection = self.connect();
        let inbox = Subject::from(format!("_inbox.{}", uuid::Uuid::new_v4()));

        let mut handle = connection
            .subscribe(SubjectPattern::from(inbox.as_str()))
            .await?;

        self.publish(subject, payload, Some(ReplyTarget::new(inbox)))
            .await;

        let reply = handle.inbox.recv().await.ok_or(Error::ConnectionClosed)?;

        connection.close().await?;
        Ok(reply.payload)
    }

    /// Fault injection: drop every registration for `pattern`, simulating
    /// a terminal stream failure on that subscription. Dispatchers reading
    /// the severed streams observe end-of-stream; other subscriptions are
    /// unaffected.
    pub async fn sever(&self, pattern: &SubjectPattern) {
        // ---
        self.router.remove_pattern(pattern).await;
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection to a [`MemoryBroker`].
struct MemoryConnection {
    // ---
    router: Arc<Router>,
    id: u64,
    draining: AtomicBool,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    close_reason: Mutex<Option<String>>,
}

impl MemoryConnection {
    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    // ---

    /// Register a subscription.
    ///
    /// Once this function returns successfully, any subsequent publishes
    /// with matching subjects are deliverable to the returned inbox.
    async fn subscribe(&self, pattern: SubjectPattern) -> Result<SubscriptionHandle> {
        // ---
        if self.is_closed() || self.draining.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        Ok(self.router.register(self.id, pattern).await)
    }

    /// Publish a payload to a concrete subject.
    ///
    /// Allowed while draining: outbound replies for in-flight messages
    /// must still reach their requesters. Fails once the connection is
    /// closed.
    async fn publish(&self, subject: Subject, payload: Bytes) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.router
            .deliver(Message {
                subject,
                payload,
                reply: None,
            })
            .await;

        Ok(())
    }

    /// Resolves once the connection has been closed.
    async fn closed(&self) -> Option<String> {
        // ---
        let mut rx = self.closed_rx.clone();

        // The sender lives in self, so wait_for cannot observe a dropped
        // channel while this borrow is alive.
        let _ = rx.wait_for(|closed| *closed).await;

        lock_ignore_poison(&self.close_reason).clone()
    }

    /// Stop intake on this connection's subscriptions.
    ///
    /// Registrations are removed from the routing table, so each inbox
    /// yields its buffered messages and then ends. Idempotent.
    async fn drain(&self) -> Result<()> {
        // ---
        if self.draining.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.router.remove_owner(self.id).await;
        Ok(())
    }

    /// Release the connection. Runs `drain()` first if it has not run,
    /// then resolves `closed()` with a graceful reason. Idempotent.
    async fn close(&self) -> Result<()> {
        // ---
        self.drain().await?;

        let _ = self.closed_tx.send(true);
        Ok(())
    }
}
