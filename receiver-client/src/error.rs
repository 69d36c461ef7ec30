use std::error;
use std::fmt;

use crate::ConnectionState;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The manager was constructed without an application id.
    MissingAppId,
    /// A message bus was requested without a namespace.
    MissingNamespace,
    /// A channel with this id has already been created.
    DuplicateChannel(String),
    /// No channel with this id is registered, or it has been evicted.
    UnknownChannel(String),
    /// No message bus with this namespace is registered on the channel.
    UnknownNamespace(String),
    /// The manager is started; `open` and `create_channel` are rejected.
    AlreadyStarted,
    /// An endpoint URL could not be built.
    InvalidUrl(String),
    /// Send attempted while the socket is closing, closed, or absent.
    TransportUnavailable {
        endpoint: String,
        state: ConnectionState,
    },
    /// A send queued while connecting exhausted the retry policy.
    SendExpired { endpoint: String, attempts: u32 },
    /// The underlying socket reported a fatal error.
    Socket(String),
    /// A payload could not be serialized.
    Encode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingAppId => write!(f, "appid must be set before opening the receiver"),
            Error::MissingNamespace => write!(f, "a message bus requires a namespace"),
            Error::DuplicateChannel(id) => write!(f, "duplicated message channel id: {}", id),
            Error::UnknownChannel(id) => write!(f, "no message channel with id {}", id),
            Error::UnknownNamespace(ns) => write!(f, "no message bus for namespace {}", ns),
            Error::AlreadyStarted => write!(f, "receiver manager is already started"),
            Error::InvalidUrl(url) => write!(f, "invalid endpoint url: {}", url),
            Error::TransportUnavailable { endpoint, state } => write!(
                f,
                "underlying socket of {} is not open (state {})",
                endpoint, state
            ),
            Error::SendExpired { endpoint, attempts } => write!(
                f,
                "send on {} dropped after {} retries while connecting",
                endpoint, attempts
            ),
            Error::Socket(message) => write!(f, "socket error: {}", message),
            Error::Encode(message) => write!(f, "payload encode error: {}", message),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encode(err.to_string())
    }
}
