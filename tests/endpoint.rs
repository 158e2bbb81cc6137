// tests/endpoint.rs

//! End-to-end endpoint behavior over the in-memory broker: request-reply
//! correctness, dispatch-loop resilience, and lifecycle transitions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use bus_endpoint::{
    // ---
    Connection,
    ConnectionPtr,
    Endpoint,
    EndpointConfig,
    Error,
    MemoryBroker,
    ReplyTarget,
    RetryConfig,
    State,
    Subject,
    SubjectPattern,
};

/// Start an endpoint against the given broker with the reference
/// subscriptions (`messages.>`, `user.>`).
async fn started_endpoint(broker: &MemoryBroker) -> Endpoint {
    // ---
    let endpoint = Endpoint::new(EndpointConfig::memory());

    let connector = {
        let broker = broker.clone();
        move || {
            let broker = broker.clone();
            async move { Ok(broker.connect()) }
        }
    };

    endpoint
        .start(connector)
        .await
        .expect("endpoint failed to start");

    endpoint
}

#[tokio::test]
async fn request_gets_processed_reply_with_timestamp() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    let reply = timeout(
        Duration::from_secs(1),
        broker.request(Subject::from("messages.new"), Bytes::from_static(b"ping")),
    )
    .await
    .expect("timed out waiting for reply")
    .expect("request failed");

    let text = String::from_utf8(reply.to_vec()).expect("reply is not UTF-8");
    let rest = text
        .strip_prefix("Processed ping at ")
        .unwrap_or_else(|| panic!("unexpected reply shape: {text}"));
    chrono::DateTime::parse_from_rfc3339(rest).expect("reply timestamp is not RFC 3339");

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn decode_failure_yields_exactly_one_error_reply() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    // Observe the reply subject directly so the reply count is visible.
    let observer = broker.connect();
    let mut replies = observer
        .subscribe(SubjectPattern::from("replies.decode"))
        .await
        .expect("subscribe failed");

    broker
        .publish(
            Subject::from("messages.bad"),
            Bytes::from_static(b"\xff\xfe"),
            Some(ReplyTarget::new(Subject::from("replies.decode"))),
        )
        .await;

    let reply = timeout(Duration::from_secs(1), replies.inbox.recv())
        .await
        .expect("timed out waiting for error reply")
        .expect("reply stream ended unexpectedly");

    let text = String::from_utf8(reply.payload.to_vec()).expect("reply is not UTF-8");
    assert!(
        text.starts_with("Error: "),
        "error reply missing prefix: {text}",
    );

    // Exactly one send: nothing else arrives on the reply subject.
    let extra = timeout(Duration::from_millis(200), replies.inbox.recv()).await;
    assert!(extra.is_err(), "unexpected second reply: {extra:?}");

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn fire_and_forget_message_triggers_no_send() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    let observer = broker.connect();
    let mut replies = observer
        .subscribe(SubjectPattern::from("replies.>"))
        .await
        .expect("subscribe failed");

    // Fire-and-forget first, then a request on the same subscription.
    // Per-subscription ordering guarantees the fire-and-forget message was
    // fully handled before the request's reply shows up.
    broker
        .publish(
            Subject::from("messages.notice"),
            Bytes::from_static(b"solo"),
            None,
        )
        .await;
    broker
        .publish(
            Subject::from("messages.question"),
            Bytes::from_static(b"ping"),
            Some(ReplyTarget::new(Subject::from("replies.one"))),
        )
        .await;

    let reply = timeout(Duration::from_secs(1), replies.inbox.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("reply stream ended unexpectedly");
    assert_eq!(reply.subject.as_str(), "replies.one");

    let extra = timeout(Duration::from_millis(200), replies.inbox.recv()).await;
    assert!(
        extra.is_err(),
        "fire-and-forget message produced a send: {extra:?}",
    );

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn severed_subscription_does_not_affect_other_dispatchers() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    // Terminal stream failure on the messages.> subscription.
    broker.sever(&SubjectPattern::from("messages.>")).await;

    // Give the severed dispatcher a moment to observe end-of-stream.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The user.> dispatcher keeps working.
    let reply = timeout(
        Duration::from_secs(1),
        broker.request(Subject::from("user.get"), Bytes::from_static(b"bob")),
    )
    .await
    .expect("timed out waiting for reply")
    .expect("request failed");

    let text = String::from_utf8(reply.to_vec()).expect("reply is not UTF-8");
    assert!(text.starts_with("Processed bob at "), "got: {text}");

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn shutdown_drains_in_flight_messages() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    // The observer lives on its own connection, so draining the endpoint's
    // connection does not cut off reply delivery.
    let observer = broker.connect();
    let mut replies = observer
        .subscribe(SubjectPattern::from("replies.inflight"))
        .await
        .expect("subscribe failed");

    for i in 0..5 {
        broker
            .publish(
                Subject::from(format!("messages.job.{i}")),
                Bytes::from(format!("job-{i}").into_bytes()),
                Some(ReplyTarget::new(Subject::from("replies.inflight"))),
            )
            .await;
    }

    // Stop immediately: every already-received message must still get its
    // reply before the connection closes.
    endpoint.stop().await.expect("stop failed");
    assert_eq!(endpoint.state(), State::Closed);

    for _ in 0..5 {
        let reply = timeout(Duration::from_secs(1), replies.inbox.recv())
            .await
            .expect("timed out waiting for drained reply")
            .expect("reply stream ended unexpectedly");

        let text = String::from_utf8(reply.payload.to_vec()).expect("reply is not UTF-8");
        assert!(text.starts_with("Processed job-"), "got: {text}");
    }
}

#[tokio::test]
async fn stop_before_start_fails_predictably_and_stop_is_idempotent() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = Endpoint::new(EndpointConfig::memory());

    assert!(matches!(endpoint.stop().await, Err(Error::NotStarted)));
    assert_eq!(endpoint.state(), State::Uninitialized);

    let connector = {
        let broker = broker.clone();
        move || {
            let broker = broker.clone();
            async move { Ok(broker.connect()) }
        }
    };
    endpoint.start(connector).await.expect("start failed");
    assert_eq!(endpoint.state(), State::SubscriptionsActive);

    endpoint.stop().await.expect("first stop failed");
    assert_eq!(endpoint.state(), State::Closed);

    // Documented no-op.
    endpoint.stop().await.expect("second stop should be a no-op");
    assert_eq!(endpoint.state(), State::Closed);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let endpoint = started_endpoint(&broker).await;

    let connector = {
        let broker = broker.clone();
        move || {
            let broker = broker.clone();
            async move { Ok(broker.connect()) }
        }
    };
    assert!(matches!(
        endpoint.start(connector).await,
        Err(Error::AlreadyStarted),
    ));

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn connect_retries_within_budget() {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let config = EndpointConfig::memory().with_retry(RetryConfig {
        max_attempts: 3,
        multiplier: 1.0,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    });
    let endpoint = Endpoint::new(config);

    let attempts = Arc::new(AtomicU32::new(0));
    let connector = {
        let broker = broker.clone();
        let attempts = attempts.clone();
        move || {
            let broker = broker.clone();
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(Error::Transport("broker offline".to_string()))
                } else {
                    Ok(broker.connect())
                }
            }
        }
    };

    endpoint.start(connector).await.expect("start failed");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(endpoint.state(), State::SubscriptionsActive);

    endpoint.stop().await.expect("stop failed");
}

#[tokio::test]
async fn connect_exhaustion_is_a_startup_failure() {
    // ---
    init_logging();

    let config = EndpointConfig::memory().with_retry(RetryConfig {
        max_attempts: 1,
        multiplier: 1.0,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    });
    let endpoint = Endpoint::new(config);

    let err = endpoint
        .start(|| async { Err::<ConnectionPtr, _>(Error::Transport("no broker".to_string())) })
        .await
        .expect_err("start should fail");

    assert!(matches!(err, Error::Connect { attempts: 2, .. }));
    assert_eq!(endpoint.state(), State::StartupFailed);

    // Nothing was started, so there is nothing to stop.
    assert!(matches!(endpoint.stop().await, Err(Error::NotStarted)));
}

mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

pub fn init_logging() {
    imp::init();
}
