//! Message channels carry presence notifications and namespaced bus traffic
//! between the receiver and its senders.

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::SenderId;

/// Frame as received on a message channel.
#[derive(Deserialize, Debug, Default)]
struct Frame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "senderId", default)]
    sender_id: Option<SenderId>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, PartialEq)]
pub enum Response {
    SenderConnected(SenderId),
    SenderDisconnected(SenderId),
    Message { sender: SenderId, data: Value },
    Unknown(String),
}

impl Response {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let frame = serde_json::from_str::<Frame>(text)?;
        let sender = frame.sender_id.unwrap_or_else(SenderId::broadcast);
        let response = match frame.kind.as_ref().map(String::as_str) {
            Some("senderConnected") => Response::SenderConnected(sender),
            // Some daemons misspell the disconnect notification.
            Some("senderDisconnected") | Some("senderDisonnected") => {
                Response::SenderDisconnected(sender)
            }
            Some("message") | None => Response::Message {
                sender,
                data: frame.data.unwrap_or(Value::Null),
            },
            Some(other) => Response::Unknown(other.to_owned()),
        };
        Ok(response)
    }
}

/// Frame sent on a message channel.
#[derive(Serialize, Debug)]
pub struct Request<'a> {
    #[serde(rename = "senderId")]
    pub sender_id: &'a SenderId,
    pub data: &'a Value,
}

/// Namespaced bus payload carried in the `data` field of a channel message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub namespace: String,
    pub payload: Value,
}

impl Envelope {
    /// `data` is either the serialized envelope or the envelope object
    /// itself.
    pub fn decode(data: &Value) -> Result<Self, serde_json::Error> {
        match data {
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        }
    }

    /// Serialize as the string stored in a channel message's `data` field.
    pub fn encode(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_string(self).map(Value::String)
    }
}

pub fn encode(sender_id: &SenderId, data: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Request { sender_id, data })
}
