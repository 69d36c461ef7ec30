use std::collections::BTreeSet;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Broadcast sentinel: a message addressed to every connected sender.
pub const BROADCAST_SENDER_ID: &str = "*:*";

/// Opaque token identifying a connected sender device.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    pub fn new(token: impl Into<String>) -> Self {
        SenderId(token.into())
    }

    pub fn broadcast() -> Self {
        SenderId(BROADCAST_SENDER_ID.to_owned())
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_SENDER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Outbound sends without a sender, or with an empty one, go to
    /// everybody.
    pub(crate) fn or_broadcast(sender: Option<&SenderId>) -> Self {
        match sender {
            Some(sender) if !sender.0.is_empty() => sender.clone(),
            _ => Self::broadcast(),
        }
    }
}

impl From<&str> for SenderId {
    fn from(token: &str) -> Self {
        SenderId(token.to_owned())
    }
}

impl From<String> for SenderId {
    fn from(token: String) -> Self {
        SenderId(token)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of currently connected senders. Connecting an already present sender
/// or disconnecting an absent one is not a transition.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Presence {
    senders: BTreeSet<SenderId>,
}

impl Presence {
    /// Returns `true` if `sender` was not present before.
    pub fn connect(&mut self, sender: SenderId) -> bool {
        self.senders.insert(sender)
    }

    /// Returns `true` if `sender` was present before.
    pub fn disconnect(&mut self, sender: &SenderId) -> bool {
        self.senders.remove(sender)
    }

    pub fn contains(&self, sender: &SenderId) -> bool {
        self.senders.contains(sender)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SenderId> {
        self.senders.iter().cloned().collect()
    }
}
