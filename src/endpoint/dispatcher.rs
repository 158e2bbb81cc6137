// src/endpoint/dispatcher.rs

//! Subscription dispatcher.
//!
//! One dispatcher owns one subscription's message stream and forwards each
//! message to the request-reply adapter, in delivery order, one at a time.
//! Dispatchers run as independent tasks: a slow message on one subscription
//! delays only that dispatcher's next message, and a terminal stream
//! failure on one subscription never affects the others.

use tokio::task::JoinHandle;

use super::handler;
use crate::{ConnectionPtr, SubscriptionHandle};

pub(crate) struct Dispatcher {
    // ---
    handler_name: String,
    connection: ConnectionPtr,
    handle: SubscriptionHandle,
    error_prefix: String,
}

impl Dispatcher {
    // ---
    pub(crate) fn new(
        handler_name: impl Into<String>,
        connection: ConnectionPtr,
        handle: SubscriptionHandle,
        error_prefix: impl Into<String>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            connection,
            handle,
            error_prefix: error_prefix.into(),
        }
    }

    /// Spawn the dispatch loop as a task.
    ///
    /// The loop ends when the subscription stream ends: on drain, close,
    /// or a severed registration. It is not the dispatcher's job to
    /// recreate the stream; reconnection belongs to the connection layer,
    /// and a dispatcher is recreated after it if continuity is required.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        // ---
        while let Some(msg) = self.handle.inbox.recv().await {
            log::info!(
                "[{}] received message on subject \"{}\"",
                self.handler_name,
                msg.subject,
            );

            // The adapter never lets a per-message failure escape, so one
            // malformed message cannot terminate this loop.
            handler::handle_message(
                &self.connection,
                &self.handler_name,
                &self.error_prefix,
                msg,
            )
            .await;
        }

        log::info!("[{}] subscription stream ended", self.handler_name);
    }
}
