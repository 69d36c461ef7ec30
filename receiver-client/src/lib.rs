#[macro_use]
extern crate log;

use futures::prelude::*;
use futures::sync::mpsc::UnboundedSender;
use futures_locks::RwLock;
use serde_json::Value;

mod channel;
mod config;
mod error;
mod hooks;
mod manager;
mod payload;
mod presence;
mod state;
#[cfg(test)]
mod testing;
mod transport;
mod worker;

pub use self::channel::{
    AppRegistration, BusAddress, ControlChannel, Delivery, MessageBus, MessageChannel,
    CHANNEL_BASE_URL_KEY,
};
pub use self::config::{
    channel_base_url, Config, RetryPolicy, DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_PORT,
    DEFAULT_CONTROL_PORT, DEFAULT_HOST,
};
pub use self::error::Error;
pub use self::hooks::{Callback, Event, EventKind, Hooks};
pub use self::manager::{Manager, Snapshot};
pub use self::presence::{Presence, SenderId, BROADCAST_SENDER_ID};
pub use self::state::ConnectionState;
pub use self::transport::{Connector, Endpoint, Socket, SocketEvent, SocketEventKind, SocketId};
pub use self::worker::run;

pub type ChannelId = String;

/// Work queued for the manager by a `Client`.
#[derive(Debug)]
pub enum Command {
    SetAdditionalData(Value),
    Send {
        bus: BusAddress,
        payload: Value,
        sender: Option<SenderId>,
    },
    SendChannel {
        channel: ChannelId,
        data: Value,
        sender: Option<SenderId>,
    },
    Close,
}

/// Cloneable handle to a running manager. Hooks run while the manager is
/// borrowed, so they talk back to it through a `Client`.
#[derive(Clone, Debug)]
pub struct Client {
    command: UnboundedSender<Command>,
    snapshot: RwLock<Snapshot>,
}

impl Client {
    pub(crate) fn new(command: UnboundedSender<Command>, snapshot: RwLock<Snapshot>) -> Self {
        Self { command, snapshot }
    }

    pub fn set_additional_data(&self, data: Value) {
        self.submit(Command::SetAdditionalData(data));
    }

    /// Send `payload` on a message bus. A missing sender broadcasts.
    pub fn send(&self, bus: &BusAddress, payload: Value, sender: Option<SenderId>) {
        self.submit(Command::Send {
            bus: bus.clone(),
            payload,
            sender,
        });
    }

    pub fn send_channel(&self, channel: &str, data: Value, sender: Option<SenderId>) {
        self.submit(Command::SendChannel {
            channel: channel.to_owned(),
            data,
            sender,
        });
    }

    pub fn close(&self) {
        self.submit(Command::Close);
    }

    /// Registries as of the last event the manager processed.
    pub fn snapshot(&self) -> impl Future<Item = Snapshot, Error = ()> {
        self.snapshot.read().map(|snapshot| (*snapshot).clone())
    }

    fn submit(&self, command: Command) {
        if let Err(err) = self.command.unbounded_send(command) {
            warn!("receiver manager is gone, dropping {:?}", err.into_inner());
        }
    }
}
