//! Endpoint lifecycle controller.
//!
//! Sequences startup (connect with a bounded retry budget, register the
//! connection-closed watcher, subscribe all configured patterns, spawn one
//! dispatcher per subscription) and graceful shutdown (drain intake, let
//! in-flight messages finish their request-reply cycle, close the
//! connection). The controller owns the connection's lifetime; dispatchers
//! only borrow it for sending replies.

mod dispatcher;
mod handler;

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;

use crate::retry::retry_with_backoff;
use crate::sync::lock_ignore_poison;
use crate::{ConnectionPtr, EndpointConfig, Error, Result};
use dispatcher::Dispatcher;

/// Lifecycle states of an endpoint.
///
/// `Connecting` transitions to `StartupFailed` when the retry budget is
/// exhausted or a subscription cannot be created; a process hosting the
/// endpoint should exit non-zero in that case, since an endpoint that
/// cannot reach its broker has no useful work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Connecting,
    SubscriptionsActive,
    Draining,
    Closed,
    StartupFailed,
}

/// A message-bus endpoint.
///
/// Connects to a broker, maintains one long-lived subscription per
/// configured subject pattern, and serves the request-reply convention on
/// every message that carries a reply target.
///
/// # Example
///
/// ```no_run
/// use bus_endpoint::{Endpoint, EndpointConfig, MemoryBroker};
///
/// # async fn example() -> bus_endpoint::Result<()> {
/// let broker = MemoryBroker::new();
/// let endpoint = Endpoint::new(EndpointConfig::memory());
///
/// let b = broker.clone();
/// endpoint
///     .start(move || {
///         let b = b.clone();
///         async move { Ok(b.connect()) }
///     })
///     .await?;
///
/// // ... traffic flows ...
///
/// endpoint.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Endpoint {
    // ---
    config: EndpointConfig,
    state: Mutex<State>,
    connection: Mutex<Option<ConnectionPtr>>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,

    /// Logs whether the connection closed gracefully or with an error.
    /// Completes on its own once `closed()` resolves; retained only to tie
    /// its lifetime to the endpoint.
    _closed_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Create an endpoint with the given configuration. Nothing happens
    /// until [`start`](Endpoint::start) is called.
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Uninitialized),
            connection: Mutex::new(None),
            dispatchers: Mutex::new(Vec::new()),
            _closed_watcher: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        *lock_ignore_poison(&self.state)
    }

    /// Start the endpoint.
    ///
    /// `connect` is the backend connector; it is invoked once per connect
    /// attempt under the configured timeout and retry budget. Startup is
    /// all-or-nothing: if any configured subscription cannot be created,
    /// the connection is released and the endpoint ends in
    /// [`State::StartupFailed`].
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if the endpoint is not in
    ///   `Uninitialized` (or `StartupFailed`, which permits another try).
    /// - [`Error::Connect`] when the retry budget is exhausted.
    /// - [`Error::Subscribe`] when a subscription cannot be created.
    pub async fn start<C, Fut>(&self, connect: C) -> Result<()>
    where
        C: Fn() -> Fut,
        Fut: Future<Output = Result<ConnectionPtr>>,
    {
        // ---
        {
            let mut state = lock_ignore_poison(&self.state);
            match *state {
                State::Uninitialized | State::StartupFailed => *state = State::Connecting,
                _ => return Err(Error::AlreadyStarted),
            }
        }

        log::info!("starting endpoint");

        let connection = match self.connect_with_retry(&connect).await {
            Ok(connection) => connection,
            Err(err) => {
                log::error!("failed to connect to broker: {err}");
                self.set_state(State::StartupFailed);
                return Err(err);
            }
        };

        log::info!("connected to broker");

        // Connection-closed notification: logs whether closure was
        // graceful or error-driven.
        let watcher = {
            let connection = connection.clone();
            tokio::spawn(async move {
                match connection.closed().await {
                    Some(reason) => log::error!("connection closed due to error: {reason}"),
                    None => log::info!("connection closed gracefully"),
                }
            })
        };
        *lock_ignore_poison(&self._closed_watcher) = Some(watcher);

        // Subscriptions are all-or-nothing: the first failure aborts
        // startup and releases the connection.
        let mut dispatchers = Vec::with_capacity(self.config.subjects.len());
        for spec in &self.config.subjects {
            let handle = match connection.subscribe(spec.pattern.clone()).await {
                Ok(handle) => handle,
                Err(err) => {
                    log::error!("error setting up subscriptions: {err}");
                    let _ = connection.close().await;
                    self.set_state(State::StartupFailed);
                    return Err(match err {
                        err @ Error::Subscribe { .. } => err,
                        err => Error::Subscribe {
                            pattern: spec.pattern.to_string(),
                            reason: err.to_string(),
                        },
                    });
                }
            };

            log::info!("subscribed to \"{}\"", spec.pattern);

            dispatchers.push(
                Dispatcher::new(
                    spec.handler_name.as_str(),
                    connection.clone(),
                    handle,
                    self.config.error_reply_prefix.as_str(),
                )
                .spawn(),
            );
        }

        *lock_ignore_poison(&self.dispatchers) = dispatchers;
        *lock_ignore_poison(&self.connection) = Some(connection);
        self.set_state(State::SubscriptionsActive);

        log::info!("endpoint ready to handle messages");
        Ok(())
    }

    /// Stop the endpoint.
    ///
    /// Drains intake on all subscriptions, waits for every dispatcher to
    /// finish the messages it has already received (each gets its reply or
    /// is logged-and-dropped), then closes the connection.
    ///
    /// Calling `stop` while already `Draining` or `Closed` is a documented
    /// no-op returning `Ok(())`. Calling it before a successful `start`
    /// fails predictably with [`Error::NotStarted`]. Drain and close
    /// failures are propagated so callers can exit non-zero.
    pub async fn stop(&self) -> Result<()> {
        // ---
        {
            let mut state = lock_ignore_poison(&self.state);
            match *state {
                State::Uninitialized | State::Connecting | State::StartupFailed => {
                    return Err(Error::NotStarted);
                }
                State::Draining | State::Closed => {
                    log::debug!("stop requested while already {:?}", *state);
                    return Ok(());
                }
                State::SubscriptionsActive => *state = State::Draining,
            }
        }

        log::info!("stopping endpoint");

        let connection = lock_ignore_poison(&self.connection)
            .clone()
            .ok_or(Error::NotStarted)?;

        connection.drain().await?;

        // In-flight messages finish their request-reply cycle before the
        // connection goes away.
        let dispatchers = std::mem::take(&mut *lock_ignore_poison(&self.dispatchers));
        for dispatcher in dispatchers {
            dispatcher
                .await
                .map_err(|err| Error::TaskPanicked(err.to_string()))?;
        }

        connection.close().await?;
        self.set_state(State::Closed);

        log::info!("endpoint stopped");
        Ok(())
    }

    fn set_state(&self, state: State) {
        *lock_ignore_poison(&self.state) = state;
    }

    /// Connect under the configured per-attempt timeout and bounded retry
    /// budget. Exhaustion is a startup failure.
    async fn connect_with_retry<C, Fut>(&self, connect: &C) -> Result<ConnectionPtr>
    where
        C: Fn() -> Fut,
        Fut: Future<Output = Result<ConnectionPtr>>,
    {
        // ---
        let timeout = self.config.connect_timeout;
        let attempts = self
            .config
            .retry
            .as_ref()
            .map(|retry| retry.total_attempts())
            .unwrap_or(1);

        retry_with_backoff(self.config.retry.as_ref(), || {
            let attempt = connect();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ConnectTimeout),
                }
            }
        })
        .await
        .map_err(|err| Error::Connect {
            attempts,
            reason: err.to_string(),
        })
    }
}
