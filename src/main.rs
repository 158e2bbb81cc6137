//! Bus endpoint process.
//!
//! Subscribes to the reference subject patterns (`messages.>`, `user.>`)
//! and serves the request-reply convention until a termination signal
//! arrives. Exits 0 on clean shutdown, non-zero on startup failure or a
//! shutdown error.
//!
//! With `BROKER_URI` unset the process runs against the in-process memory
//! broker and spawns a small demo requester so there is traffic to watch.
//! With `BROKER_URI` set it connects to a real broker (requires the `nats`
//! feature).

use std::process::ExitCode;
use std::time::Duration;

use bus_endpoint::{Endpoint, EndpointConfig, MemoryBroker, Subject};
use bytes::Bytes;

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    env_logger::init();

    match std::env::var("BROKER_URI") {
        Ok(uri) => run_broker(EndpointConfig::with_broker(uri)).await,
        Err(_) => run_memory(EndpointConfig::memory()).await,
    }
}

async fn run_memory(config: EndpointConfig) -> ExitCode {
    // ---
    let broker = MemoryBroker::new();
    let endpoint = Endpoint::new(config);

    let connector = {
        let broker = broker.clone();
        move || {
            let broker = broker.clone();
            async move { Ok(broker.connect()) }
        }
    };

    if let Err(err) = endpoint.start(connector).await {
        log::error!("failed to start endpoint: {err}");
        return ExitCode::from(1);
    }

    // Demo traffic so the in-process broker has something to dispatch.
    let demo = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let request = broker
                    .request(Subject::from("messages.demo"), Bytes::from_static(b"ping"))
                    .await;
                match request {
                    Ok(reply) => {
                        log::info!("demo requester got: {}", String::from_utf8_lossy(&reply));
                    }
                    Err(err) => {
                        log::warn!("demo request failed: {err}");
                        break;
                    }
                }
            }
        })
    };

    wait_for_shutdown().await;
    demo.abort();
    shutdown(&endpoint).await
}

#[cfg(feature = "nats")]
async fn run_broker(config: EndpointConfig) -> ExitCode {
    // ---
    let endpoint = Endpoint::new(config.clone());

    if let Err(err) = endpoint.start(|| bus_endpoint::connect_nats(&config)).await {
        log::error!("failed to start endpoint: {err}");
        return ExitCode::from(1);
    }

    wait_for_shutdown().await;
    shutdown(&endpoint).await
}

#[cfg(not(feature = "nats"))]
async fn run_broker(_config: EndpointConfig) -> ExitCode {
    // ---
    log::error!("BROKER_URI is set but this build has no broker backend (enable the `nats` feature)");
    ExitCode::from(1)
}

async fn wait_for_shutdown() {
    // ---
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("received termination signal"),
        Err(err) => log::error!("failed to listen for termination signal: {err}"),
    }
}

async fn shutdown(endpoint: &Endpoint) -> ExitCode {
    // ---
    match endpoint.stop().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("error during shutdown: {err}");
            ExitCode::from(1)
        }
    }
}
