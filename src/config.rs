//! Public, backend-agnostic endpoint configuration.
//!
//! This type intentionally contains no backend-specific concepts
//! (e.g. broker client options). Connection backends are responsible
//! for interpreting this config into concrete connection settings.

use crate::domain::SubjectPattern;
use crate::retry::RetryConfig;
use std::time::Duration;

/// One configured subscription: the pattern to subscribe to and the
/// handler label used in diagnostics.
#[derive(Debug, Clone)]
pub struct SubjectSpec {
    /// Subject pattern registered with the broker at startup.
    pub pattern: SubjectPattern,

    /// Handler name, used only for logging. Not part of the
    /// correctness contract.
    pub handler_name: String,
}

impl SubjectSpec {
    /// Create a subject spec.
    pub fn new(pattern: impl Into<SubjectPattern>, handler_name: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler_name: handler_name.into(),
        }
    }
}

/// Endpoint configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    // ---
    /// Broker connection URI (e.g. "nats://localhost:4222").
    ///
    /// `None` selects the in-process memory broker, which requires no
    /// external resources.
    pub broker_uri: Option<String>,

    /// Timeout applied to each individual connect attempt.
    ///
    /// Default: 3 seconds
    pub connect_timeout: Duration,

    /// Bounded reconnection policy for the initial connect.
    ///
    /// `None` means a single attempt. Exhausting the budget is a startup
    /// failure; the endpoint never retries indefinitely.
    pub retry: Option<RetryConfig>,

    /// Subject patterns to subscribe to at startup, with their handler
    /// labels. Startup is all-or-nothing across these.
    pub subjects: Vec<SubjectSpec>,

    /// Prefix prepended to the error description when a handling failure
    /// is converted into an error reply.
    ///
    /// Default: `"Error: "`
    pub error_reply_prefix: String,
}

impl EndpointConfig {
    /// Create a config for the given broker URI with the reference
    /// subscriptions (`messages.>` and `user.>`).
    pub fn with_broker(broker_uri: impl Into<String>) -> Self {
        Self {
            broker_uri: Some(broker_uri.into()),
            ..Self::memory()
        }
    }

    /// Create a memory-broker config (no external broker) with the
    /// reference subscriptions.
    pub fn memory() -> Self {
        Self {
            broker_uri: None,
            connect_timeout: Duration::from_secs(3),
            retry: Some(RetryConfig::default()),
            subjects: vec![
                SubjectSpec::new("messages.>", "message-handler"),
                SubjectSpec::new("user.>", "user-handler"),
            ],
            error_reply_prefix: "Error: ".to_string(),
        }
    }

    /// Set the per-attempt connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configure the bounded connect retry policy.
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Disable connect retries (single attempt).
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    /// Replace the configured subscriptions.
    pub fn with_subjects(mut self, subjects: Vec<SubjectSpec>) -> Self {
        self.subjects = subjects;
        self
    }

    /// Append one subscription to the configured set.
    pub fn with_subject(
        mut self,
        pattern: impl Into<SubjectPattern>,
        handler_name: impl Into<String>,
    ) -> Self {
        self.subjects.push(SubjectSpec::new(pattern, handler_name));
        self
    }

    /// Set the prefix used for error replies.
    pub fn with_error_reply_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_reply_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn memory_config_has_reference_subscriptions() {
        // ---
        let config = EndpointConfig::memory();

        assert!(config.broker_uri.is_none());
        assert_eq!(config.subjects.len(), 2);
        assert_eq!(config.subjects[0].pattern.as_str(), "messages.>");
        assert_eq!(config.subjects[1].pattern.as_str(), "user.>");
        assert_eq!(config.error_reply_prefix, "Error: ");
    }

    #[test]
    fn builder_replaces_and_appends_subjects() {
        // ---
        let config = EndpointConfig::memory()
            .with_subjects(vec![SubjectSpec::new("orders.>", "order-handler")])
            .with_subject("audit.>", "audit-handler");

        assert_eq!(config.subjects.len(), 2);
        assert_eq!(config.subjects[0].handler_name, "order-handler");
        assert_eq!(config.subjects[1].pattern.as_str(), "audit.>");
    }
}
