use std::collections::VecDeque;

use url::Url;

use crate::config::RetryPolicy;
use crate::transport::{Connector, Endpoint, Socket, SocketEventKind, SocketId};
use crate::{ConnectionState, Error};

/// Outcome of a successful `Link::send`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// Handed to the socket.
    Sent,
    /// Queued until the socket opens or earlier sends drain.
    Deferred,
}

/// What a socket event meant for the owner of the link.
#[derive(Debug, Eq, PartialEq)]
pub enum LinkEvent {
    Opened,
    Message(String),
    Closed,
    Failed(String),
}

#[derive(Debug)]
struct Pending {
    text: String,
    attempts: u32,
}

/// One socket and its connection state machine. Control and message channels
/// are both built on a link.
#[derive(Debug)]
pub struct Link {
    endpoint: Endpoint,
    url: Url,
    retry: RetryPolicy,
    socket: Option<Box<dyn Socket>>,
    state: ConnectionState,
    generation: u64,
    pending: VecDeque<Pending>,
}

impl Link {
    pub fn new(endpoint: Endpoint, url: Url, retry: RetryPolicy) -> Self {
        Self {
            endpoint,
            url,
            retry,
            socket: None,
            state: ConnectionState::Closed,
            generation: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Construct a new socket unless one is already connecting or open.
    /// Returns whether a socket was created.
    pub fn open(&mut self, connector: &mut dyn Connector) -> bool {
        if self.state.is_active() {
            warn!(
                "{} state is {}, cannot reopen",
                self.endpoint, self.state
            );
            return false;
        }
        self.generation += 1;
        let id = SocketId {
            endpoint: self.endpoint.clone(),
            generation: self.generation,
        };
        debug!("{} connecting to {}", self.endpoint, self.url);
        self.socket = Some(connector.connect(id, &self.url));
        self.state = ConnectionState::Connecting;
        true
    }

    /// Request the socket to close. Every queued send is cancelled.
    pub fn close(&mut self) {
        self.cancel_pending();
        let socket = match self.socket.as_mut() {
            Some(socket) => socket,
            None => return,
        };
        socket.close();
        match self.state {
            ConnectionState::Open => {
                self.transition(ConnectionState::Closing);
            }
            ConnectionState::Connecting => {
                self.transition(ConnectionState::Closed);
                self.socket = None;
            }
            _ => {}
        }
    }

    pub fn send(&mut self, text: String) -> Result<Delivery, Error> {
        match (self.state, self.socket.as_mut()) {
            (ConnectionState::Open, Some(_)) if !self.pending.is_empty() => {
                debug!("{} flushing, send queued behind earlier sends", self.endpoint);
                self.pending.push_back(Pending { text, attempts: 0 });
                Ok(Delivery::Deferred)
            }
            (ConnectionState::Open, Some(socket)) => {
                trace!("{} send: {}", self.endpoint, text);
                socket.send(text)?;
                Ok(Delivery::Sent)
            }
            (ConnectionState::Connecting, Some(_)) => {
                debug!("{} not ready, send delayed", self.endpoint);
                self.pending.push_back(Pending { text, attempts: 0 });
                Ok(Delivery::Deferred)
            }
            (state, _) => {
                error!("{} not ready, send failed", self.endpoint);
                Err(Error::TransportUnavailable {
                    endpoint: self.endpoint.to_string(),
                    state,
                })
            }
        }
    }

    /// Retry queued sends. Once open, the queue is flushed in order; while
    /// connecting, sends that used up the retry policy are dropped and
    /// returned as errors.
    pub fn tick(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();
        match self.state {
            ConnectionState::Open => errors = self.flush(),
            ConnectionState::Connecting => {
                let max_attempts = self.retry.max_attempts;
                for pending in &mut self.pending {
                    pending.attempts += 1;
                }
                while self
                    .pending
                    .front()
                    .map_or(false, |pending| pending.attempts >= max_attempts)
                {
                    self.pending.pop_front();
                    warn!(
                        "{} still connecting, dropping send after {} retries",
                        self.endpoint, max_attempts
                    );
                    errors.push(Error::SendExpired {
                        endpoint: self.endpoint.to_string(),
                        attempts: max_attempts,
                    });
                }
            }
            _ => self.cancel_pending(),
        }
        errors
    }

    /// Apply a socket event. Events of a replaced socket are ignored.
    pub fn handle(&mut self, id: &SocketId, kind: SocketEventKind) -> Option<LinkEvent> {
        if id.generation != self.generation || self.socket.is_none() {
            debug!(
                "{} ignoring event of stale socket generation {}",
                self.endpoint, id.generation
            );
            return None;
        }
        match kind {
            SocketEventKind::Opened => {
                if self.transition(ConnectionState::Open) {
                    info!("{} open", self.endpoint);
                    for err in self.flush() {
                        warn!("{} queued send failed: {}", self.endpoint, err);
                    }
                    Some(LinkEvent::Opened)
                } else {
                    None
                }
            }
            SocketEventKind::Message(text) => {
                trace!("{} received: {}", self.endpoint, text);
                Some(LinkEvent::Message(text))
            }
            SocketEventKind::Closed => {
                info!("{} closed", self.endpoint);
                self.transition(ConnectionState::Closed);
                self.socket = None;
                self.cancel_pending();
                Some(LinkEvent::Closed)
            }
            SocketEventKind::Errored(message) => {
                error!("{} error: {}", self.endpoint, message);
                self.transition(ConnectionState::Closed);
                self.socket = None;
                self.cancel_pending();
                Some(LinkEvent::Failed(message))
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                "{} ignoring illegal transition {} -> {}",
                self.endpoint, self.state, next
            );
            return false;
        }
        trace!("{} {} -> {}", self.endpoint, self.state, next);
        self.state = next;
        true
    }

    /// Hand every queued send to the open socket, oldest first.
    fn flush(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();
        let socket = match self.socket.as_mut() {
            Some(socket) => socket,
            None => return errors,
        };
        while let Some(pending) = self.pending.pop_front() {
            trace!("{} send: {}", self.endpoint, pending.text);
            if let Err(err) = socket.send(pending.text) {
                errors.push(err);
            }
        }
        errors
    }

    fn cancel_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "{} cancelling {} queued sends",
                self.endpoint,
                self.pending.len()
            );
            self.pending.clear();
        }
    }
}
