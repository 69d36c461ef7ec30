use std::fmt;

use serde_json::Value;

use crate::hooks::{Event, EventKind, Hooks};
use crate::payload::channel::Envelope;
use crate::presence::Presence;
use crate::{ChannelId, SenderId};

/// Where a message bus lives: the channel it is multiplexed on and its
/// namespace. The channel is referenced by id, so an address of an evicted
/// channel resolves to nothing.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BusAddress {
    pub channel: ChannelId,
    pub namespace: String,
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.namespace, self.channel)
    }
}

/// A namespace-scoped endpoint layered over a message channel. The bus keeps
/// its own view of the channel's senders.
#[derive(Debug)]
pub struct MessageBus {
    address: BusAddress,
    senders: Presence,
    hooks: Hooks,
}

impl MessageBus {
    pub(crate) fn new(channel: &str, namespace: &str) -> Self {
        Self {
            address: BusAddress {
                channel: channel.to_owned(),
                namespace: namespace.to_owned(),
            },
            senders: Presence::default(),
            hooks: Hooks::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.address.namespace
    }

    pub fn channel_id(&self) -> &str {
        &self.address.channel
    }

    pub fn address(&self) -> &BusAddress {
        &self.address
    }

    pub fn senders(&self) -> Vec<SenderId> {
        self.senders.snapshot()
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    /// Register a callback for `Message`, `SenderConnected` or
    /// `SenderDisconnected` events of this bus.
    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> &mut Self
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.hooks.on(kind, callback);
        self
    }

    pub fn off(&mut self, kind: EventKind) -> &mut Self {
        self.hooks.off(kind);
        self
    }

    pub(crate) fn envelope(&self, payload: Value) -> Envelope {
        Envelope {
            namespace: self.address.namespace.clone(),
            payload,
        }
    }

    pub(crate) fn sender_connected(&mut self, sender: &SenderId) {
        if self.senders.connect(sender.clone()) {
            self.hooks.emit(&Event::SenderConnected(sender.clone()));
        }
    }

    pub(crate) fn sender_disconnected(&mut self, sender: &SenderId) {
        if self.senders.disconnect(sender) {
            self.hooks.emit(&Event::SenderDisconnected(sender.clone()));
        }
    }

    pub(crate) fn deliver(&mut self, sender: SenderId, payload: Value) {
        trace!("{} delivering message from {}", self.address, sender);
        self.hooks.emit(&Event::Message { sender, payload });
    }
}
