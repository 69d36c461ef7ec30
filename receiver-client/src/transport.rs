//! Seam between the protocol core and the sockets it drives.
//!
//! The core never blocks on a socket. It asks a [`Connector`] for a new
//! [`Socket`] and later learns what happened to it through [`SocketEvent`]s
//! fed to [`Manager::handle`](crate::Manager::handle).

use std::fmt;

use url::Url;

use crate::{ChannelId, Error};

/// Which connection of the manager a socket belongs to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Endpoint {
    Control,
    Channel(ChannelId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Control => write!(f, "control channel"),
            Endpoint::Channel(id) => write!(f, "message channel [{}]", id),
        }
    }
}

/// Identifies one socket instance. Every `open` of an endpoint creates a new
/// generation, so events from a replaced socket can be told apart.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SocketId {
    pub endpoint: Endpoint,
    pub generation: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SocketEventKind {
    Opened,
    Message(String),
    Closed,
    Errored(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SocketEvent {
    pub id: SocketId,
    pub kind: SocketEventKind,
}

impl SocketEvent {
    pub fn new(id: SocketId, kind: SocketEventKind) -> Self {
        Self { id, kind }
    }
}

/// Write side of a duplex, message-oriented socket.
pub trait Socket: fmt::Debug + Send {
    fn send(&mut self, text: String) -> Result<(), Error>;

    fn close(&mut self);
}

/// Constructs sockets. Implementations must return immediately and report the
/// outcome of the connection attempt as `SocketEvent`s tagged with `id`.
pub trait Connector {
    fn connect(&mut self, id: SocketId, url: &Url) -> Box<dyn Socket>;
}
