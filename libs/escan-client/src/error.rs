use serde_json::Value;

use crate::protocol::SubscriptionId;

/// Error reported by the server for a subscription.
///
/// `Display` is the server's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `{"message": "..."}` → message, bare string → itself,
    /// anything else → its compact JSON text.
    pub(crate) fn from_payload(payload: Value) -> Self {
        match payload {
            Value::String(message) => Self { message },
            Value::Object(map) => {
                if let Some(message) = map.get("message").and_then(Value::as_str) {
                    return Self::new(message);
                }
                Self { message: Value::Object(map).to_string() }
            }
            other => Self { message: other.to_string() },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect {endpoint}: {detail}")]
    Connect { endpoint: String, detail: String },

    #[error("not connected")]
    NotConnected,

    #[error("subscription {0} is still active")]
    SubscriptionActive(SubscriptionId),

    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("connection closed before subscription {0} resolved")]
    Disconnected(SubscriptionId),

    #[error("encode request: {0}")]
    Encode(#[from] serde_json::Error),
}
