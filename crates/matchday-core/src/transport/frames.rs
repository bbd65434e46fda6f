use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::ResourceKind;

/// Frames the client sends to the push server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    /// Keep-alive; `ts` is Unix epoch milliseconds.
    Ping { ts: i64 },
}

impl ClientFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The kinds of server message the client knows how to route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Frames without a `type` field.
    Message,
    Pong,
    /// Full replacement of a resource entry.
    Replace(ResourceKind),
    /// Removal of one item from a resource's collection.
    Remove(ResourceKind),
    Other(String),
}

impl MessageKind {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return MessageKind::Message;
        };
        match raw {
            "message" => MessageKind::Message,
            "pong" => MessageKind::Pong,
            _ => match raw.split_once(':') {
                Some((kind, "replace")) => ResourceKind::parse(kind)
                    .map(MessageKind::Replace)
                    .unwrap_or_else(|| MessageKind::Other(raw.to_string())),
                Some((kind, "remove")) => ResourceKind::parse(kind)
                    .map(MessageKind::Remove)
                    .unwrap_or_else(|| MessageKind::Other(raw.to_string())),
                _ => MessageKind::Other(raw.to_string()),
            },
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Message => write!(f, "message"),
            MessageKind::Pong => write!(f, "pong"),
            MessageKind::Replace(kind) => write!(f, "{}:replace", kind),
            MessageKind::Remove(kind) => write!(f, "{}:remove", kind),
            MessageKind::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// A parsed server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub kind: MessageKind,
    pub topic: Option<String>,
    pub payload: Value,
}

impl InboundFrame {
    /// Parse a text frame. Returns `None` for anything that is not a JSON
    /// object, or whose `type` is present but not a string.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let Value::Object(mut record) = value else {
            return None;
        };
        let kind = match record.get("type") {
            None | Some(Value::Null) => MessageKind::Message,
            Some(Value::String(raw)) => MessageKind::parse(Some(raw)),
            Some(_) => return None,
        };
        let topic = match record.remove("topic") {
            Some(Value::String(topic)) => Some(topic),
            _ => None,
        };
        let payload = record.remove("payload").unwrap_or(Value::Null);
        Some(Self { kind, topic, payload })
    }

    /// The payload as an object, if it is one.
    pub fn payload_record(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }
}
