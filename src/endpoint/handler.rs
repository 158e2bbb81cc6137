// src/endpoint/handler.rs

//! Request-reply adapter.
//!
//! Decodes an inbound payload, produces the business response, and routes
//! it back through the message's reply target. All per-message failures
//! are converted here: a handling error becomes an error reply when the
//! sender is waiting for one, and a log line otherwise. Nothing in this
//! module returns an error to the dispatch loop.

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};

use crate::{ConnectionPtr, Message, Result};

/// Handle one inbound message.
///
/// Guarantees exactly one outbound send iff the message carries a reply
/// target (success or error branch, never both, never zero), and zero
/// sends otherwise. A publish failure on the reply path is logged; there
/// is nothing further to tell the requester at that point.
pub(crate) async fn handle_message(
    connection: &ConnectionPtr,
    handler_name: &str,
    error_prefix: &str,
    msg: Message,
) {
    // ---
    match process(&msg) {
        Ok(response) => {
            if let Some(reply) = &msg.reply {
                let payload = Bytes::from(response.clone().into_bytes());
                match connection.respond(reply, payload).await {
                    Ok(()) => log::info!("[{handler_name}] sent reply: {response}"),
                    Err(err) => log::error!("[{handler_name}] failed to send reply: {err}"),
                }
            }
        }
        Err(err) => {
            log::error!("[{handler_name}] error processing message: {err}");

            if let Some(reply) = &msg.reply {
                let payload = Bytes::from(format!("{error_prefix}{err}").into_bytes());
                if let Err(send_err) = connection.respond(reply, payload).await {
                    log::error!("[{handler_name}] failed to send error reply: {send_err}");
                }
            }
        }
    }
}

/// Decode the payload and synthesize the response value.
///
/// The payload is decoded with a fixed UTF-8 codec; decode failure is a
/// handling failure, not a crash. The response format is
/// `Processed {data} at {UTC timestamp, ISO-8601}`.
fn process(msg: &Message) -> Result<String> {
    // ---
    let data = std::str::from_utf8(&msg.payload)?;

    Ok(format!(
        "Processed {data} at {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{Error, Subject};
    use chrono::DateTime;

    fn msg(payload: &'static [u8]) -> Message {
        Message {
            subject: Subject::from("messages.test"),
            payload: Bytes::from_static(payload),
            reply: None,
        }
    }

    #[test]
    fn response_embeds_data_and_parseable_timestamp() {
        // ---
        let response = process(&msg(b"ping")).expect("valid payload");

        let rest = response
            .strip_prefix("Processed ping at ")
            .expect("unexpected response shape");

        DateTime::parse_from_rfc3339(rest).expect("timestamp is not RFC 3339");
    }

    #[test]
    fn invalid_utf8_is_a_decode_failure() {
        // ---
        let err = process(&msg(b"\xff\xfe")).expect_err("payload should not decode");
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().starts_with("payload is not valid UTF-8"));
    }
}
