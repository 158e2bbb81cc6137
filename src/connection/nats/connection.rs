// src/connection/nats/connection.rs

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    Connection,
    ConnectionPtr,
    EndpointConfig,
    Error,
    Message,
    ReplyTarget,
    Result,
    Subject,
    SubjectPattern,
    SubscriptionHandle,
};

/// Per-subscription bridge capacity between the NATS subscriber and the
/// domain inbox.
const INBOX_CAPACITY: usize = 64;

/// Connect to a NATS server using the endpoint configuration.
///
/// Applies the configured per-attempt timeout; the bounded retry policy is
/// applied by the endpoint around this function.
pub async fn connect(config: &EndpointConfig) -> Result<ConnectionPtr> {
    // ---
    let uri = config
        .broker_uri
        .clone()
        .ok_or_else(|| Error::Transport("no broker URI configured".to_string()))?;

    let (closed_tx, closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);
    let close_reason = Arc::new(Mutex::new(None::<String>));

    let cb_closed = closed_tx.clone();
    let cb_reason = close_reason.clone();

    let options = async_nats::ConnectOptions::new()
        .connection_timeout(config.connect_timeout)
        .event_callback(move |event| {
            // ---
            let closed = cb_closed.clone();
            let reason = cb_reason.clone();

            async move {
                match event {
                    async_nats::Event::Closed => {
                        let _ = closed.send(true);
                    }
                    async_nats::Event::ClientError(err) => {
                        *lock_ignore_poison(&reason) = Some(err.to_string());
                    }
                    event => log::debug!("connection event: {event}"),
                }
            }
        });

    let client = options
        .connect(uri.as_str())
        .await
        .map_err(|err| Error::Transport(err.to_string()))?;

    let (drain_tx, drain_rx) = watch::channel(false);

    Ok(Arc::new(NatsConnection {
        client,
        drain_tx,
        drain_rx,
        bridges: Mutex::new(Vec::new()),
        closed_tx,
        closed_rx,
        close_reason,
    }))
}

/// One connection to a NATS server.
struct NatsConnection {
    // ---
    client: async_nats::Client,

    /// Broadcasts the drain signal to every subscription bridge.
    drain_tx: watch::Sender<bool>,
    drain_rx: watch::Receiver<bool>,

    /// Bridge tasks, joined during drain so intake has fully stopped
    /// before shutdown proceeds.
    bridges: Mutex<Vec<JoinHandle<()>>>,

    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    close_reason: Arc<Mutex<Option<String>>>,
}

fn to_message(msg: async_nats::Message) -> Message {
    // ---
    Message {
        subject: Subject::from(msg.subject.as_str()),
        payload: msg.payload,
        reply: msg
            .reply
            .map(|reply| ReplyTarget::new(Subject::from(reply.as_str()))),
    }
}

#[async_trait::async_trait]
impl Connection for NatsConnection {
    // ---
    async fn subscribe(&self, pattern: SubjectPattern) -> Result<SubscriptionHandle> {
        // ---
        let mut subscriber = self
            .client
            .subscribe(pattern.as_str().to_string())
            .await
            .map_err(|err| Error::Subscribe {
                pattern: pattern.to_string(),
                reason: err.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let mut drain_rx = self.drain_rx.clone();

        let bridge = tokio::spawn(async move {
            // ---
            loop {
                tokio::select! {
                    msg = subscriber.next() => match msg {
                        Some(msg) => {
                            if tx.send(to_message(msg)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    changed = drain_rx.changed() => {
                        if changed.is_err() || *drain_rx.borrow() {
                            // Graceful unsubscribe, then flush what the
                            // subscriber already buffered.
                            let _ = subscriber.unsubscribe().await;
                            while let Some(msg) = subscriber.next().await {
                                if tx.send(to_message(msg)).await.is_err() {
                                    break;
                                }
                            }
                            break;
                        }
                    }
                }
            }
        });

        lock_ignore_poison(&self.bridges).push(bridge);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn publish(&self, subject: Subject, payload: Bytes) -> Result<()> {
        // ---
        self.client
            .publish(subject.as_str().to_string(), payload)
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    async fn closed(&self) -> Option<String> {
        // ---
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;

        lock_ignore_poison(&self.close_reason).clone()
    }

    /// Unsubscribe every subscription and wait until their bridges have
    /// delivered all pending messages. The client stays connected so
    /// replies can still be published. Idempotent.
    async fn drain(&self) -> Result<()> {
        // ---
        let _ = self.drain_tx.send(true);

        let bridges = std::mem::take(&mut *lock_ignore_poison(&self.bridges));
        for bridge in bridges {
            bridge
                .await
                .map_err(|err| Error::Drain(err.to_string()))?;
        }

        Ok(())
    }

    /// Drain the subscriptions if needed, then drain the client itself,
    /// which flushes pending outbound messages and closes the connection.
    async fn close(&self) -> Result<()> {
        // ---
        self.drain().await?;

        self.client
            .drain()
            .await
            .map_err(|err| Error::Close(err.to_string()))?;

        let _ = self.closed_tx.send(true);
        Ok(())
    }
}
