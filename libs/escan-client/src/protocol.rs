use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

// ═══════════════════════════════════════════════════════════════
//  Identifiers & queries
// ═══════════════════════════════════════════════════════════════

/// Client-assigned subscription identifier, echoed back by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filter of a `sub` request. Values are sent as given, no client-side checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionQuery {
    pub topic: String,
    /// Sort field.
    pub by: String,
    pub health_max: u64,
    pub limit: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Client → server
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub(crate) enum ClientFrame<'a> {
    Sub {
        id: SubscriptionId,
        query: &'a SubscriptionQuery,
    },
    Unsub {
        id: SubscriptionId,
    },
}

impl ClientFrame<'_> {
    pub(crate) fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Server → client
// ═══════════════════════════════════════════════════════════════

/// Which subscription a server frame belongs to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route {
    /// No `id` in the frame: goes to whatever subscription is active.
    Active,
    To(SubscriptionId),
    /// `id` present but neither an unsigned integer nor a numeric string.
    Invalid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    err: Option<Value>,
}

impl ServerFrame {
    pub(crate) fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub(crate) fn route(&self) -> Route {
        match &self.id {
            None => Route::Active,
            Some(Value::Number(n)) => n.as_u64().map_or(Route::Invalid, |raw| Route::To(SubscriptionId(raw))),
            Some(Value::String(s)) => s.parse::<u64>().map_or(Route::Invalid, |raw| Route::To(SubscriptionId(raw))),
            Some(_) => Route::Invalid,
        }
    }

    /// A truthy `err` wins over `result`. `false`, `0` and `""` count as no
    /// error, like `null`. A frame with neither is a `null` result.
    pub(crate) fn into_outcome(self) -> Result<Value, RemoteError> {
        match self.err.filter(is_truthy) {
            Some(err) => Err(RemoteError::from_payload(err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
