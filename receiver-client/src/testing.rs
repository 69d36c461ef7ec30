//! Recording in-memory sockets for exercising the protocol without a network.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use url::Url;

use crate::transport::{Connector, Endpoint, Socket, SocketEvent, SocketEventKind, SocketId};
use crate::Error;

#[derive(Debug, Default)]
struct Shared {
    connections: Vec<(SocketId, Url)>,
    sent: HashMap<SocketId, Vec<String>>,
    closed: HashSet<SocketId>,
}

#[derive(Clone, Debug, Default)]
pub struct Recorder {
    shared: Arc<Mutex<Shared>>,
}

impl Recorder {
    pub fn connections(&self) -> Vec<(SocketId, Url)> {
        self.shared.lock().unwrap().connections.clone()
    }

    /// Id of the most recent socket created for `endpoint`.
    pub fn latest(&self, endpoint: &Endpoint) -> SocketId {
        self.connections()
            .into_iter()
            .rev()
            .map(|(id, _)| id)
            .find(|id| &id.endpoint == endpoint)
            .expect("no socket for endpoint")
    }

    pub fn sent(&self, id: &SocketId) -> Vec<String> {
        self.shared
            .lock()
            .unwrap()
            .sent
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn sent_json(&self, id: &SocketId) -> Vec<Value> {
        self.sent(id)
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn is_closed(&self, id: &SocketId) -> bool {
        self.shared.lock().unwrap().closed.contains(id)
    }
}

impl Connector for Recorder {
    fn connect(&mut self, id: SocketId, url: &Url) -> Box<dyn Socket> {
        self.shared
            .lock()
            .unwrap()
            .connections
            .push((id.clone(), url.clone()));
        Box::new(FakeSocket {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

#[derive(Debug)]
struct FakeSocket {
    id: SocketId,
    shared: Arc<Mutex<Shared>>,
}

impl Socket for FakeSocket {
    fn send(&mut self, text: String) -> Result<(), Error> {
        let mut shared = self.shared.lock().unwrap();
        shared.sent.entry(self.id.clone()).or_default().push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.shared.lock().unwrap().closed.insert(self.id.clone());
    }
}

pub fn event(id: &SocketId, kind: SocketEventKind) -> SocketEvent {
    SocketEvent::new(id.clone(), kind)
}

pub fn message(id: &SocketId, json: Value) -> SocketEvent {
    event(id, SocketEventKind::Message(json.to_string()))
}
