use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::{ChannelId, Error, SenderId};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Open,
    Close,
    Error,
    SenderConnected,
    SenderDisconnected,
    Message,
    ChannelLost,
}

/// Events delivered to application hooks on the manager, on a message
/// channel, or on a message bus.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Open,
    Close,
    Error(Error),
    SenderConnected(SenderId),
    SenderDisconnected(SenderId),
    Message { sender: SenderId, payload: Value },
    /// A message channel failed and was removed from the manager.
    ChannelLost(ChannelId),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Close => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::SenderConnected(_) => EventKind::SenderConnected,
            Event::SenderDisconnected(_) => EventKind::SenderDisconnected,
            Event::Message { .. } => EventKind::Message,
            Event::ChannelLost(_) => EventKind::ChannelLost,
        }
    }
}

pub type Callback = Box<dyn FnMut(&Event) + Send>;

/// Registration table of optional application callbacks, one per event kind.
/// Unregistered kinds are a no-op.
#[derive(Default)]
pub struct Hooks {
    table: HashMap<EventKind, Callback>,
}

impl Hooks {
    /// Register `callback` for `kind`, replacing any earlier registration.
    pub fn on<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.table.insert(kind, Box::new(callback));
    }

    pub fn off(&mut self, kind: EventKind) {
        self.table.remove(&kind);
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.table.contains_key(&kind)
    }

    /// Invoke the callback registered for the event's kind. Returns whether
    /// a callback ran.
    pub fn emit(&mut self, event: &Event) -> bool {
        if let Some(callback) = self.table.get_mut(&event.kind()) {
            callback(event);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}
