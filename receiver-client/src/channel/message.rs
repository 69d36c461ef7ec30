use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::channel::bus::MessageBus;
use crate::channel::link::{Delivery, Link, LinkEvent};
use crate::config::Config;
use crate::hooks::{Event, EventKind, Hooks};
use crate::payload::channel::{self, Envelope, Response};
use crate::presence::Presence;
use crate::transport::{Connector, Endpoint, SocketEventKind, SocketId};
use crate::{ChannelId, ConnectionState, Error, SenderId};

/// A data connection to the daemon, multiplexing message buses by namespace.
#[derive(Debug)]
pub struct MessageChannel {
    id: ChannelId,
    link: Link,
    buses: BTreeMap<String, MessageBus>,
    senders: Presence,
    hooks: Hooks,
}

impl MessageChannel {
    pub(crate) fn new(id: &str, config: &Config) -> Result<Self, Error> {
        let url = config.channel_url(id)?;
        let link = Link::new(Endpoint::Channel(id.to_owned()), url, config.retry);
        Ok(Self {
            id: id.to_owned(),
            link,
            buses: BTreeMap::new(),
            senders: Presence::default(),
            hooks: Hooks::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn url(&self) -> &Url {
        self.link.url()
    }

    /// Register a callback for channel-level events: `Open`, `Close`,
    /// `Error`, `SenderConnected`, `SenderDisconnected` and raw `Message`s.
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

    /// Get the bus for `namespace`, creating it on first request.
    pub fn create_message_bus(&mut self, namespace: &str) -> Result<&mut MessageBus, Error> {
        if namespace.is_empty() {
            error!("message channel [{}] cannot create a bus without a namespace", self.id);
            return Err(Error::MissingNamespace);
        }
        let id = &self.id;
        let senders = &self.senders;
        let bus = self.buses.entry(namespace.to_owned()).or_insert_with(|| {
            debug!("message channel [{}] created bus {}", id, namespace);
            let mut bus = MessageBus::new(id, namespace);
            // A late bus starts with the senders already on the channel.
            for sender in senders.snapshot() {
                bus.sender_connected(&sender);
            }
            bus
        });
        Ok(bus)
    }

    pub fn message_bus(&self, namespace: &str) -> Option<&MessageBus> {
        self.buses.get(namespace)
    }

    pub fn message_bus_mut(&mut self, namespace: &str) -> Option<&mut MessageBus> {
        self.buses.get_mut(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.buses.keys().cloned().collect()
    }

    pub fn senders(&self) -> Vec<SenderId> {
        self.senders.snapshot()
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    pub(crate) fn open(&mut self, connector: &mut dyn Connector) -> bool {
        self.link.open(connector)
    }

    pub(crate) fn close(&mut self) {
        self.link.close();
    }

    /// Send a raw channel message.
    pub(crate) fn send(
        &mut self,
        data: &Value,
        sender: Option<&SenderId>,
    ) -> Result<Delivery, Error> {
        let sender = SenderId::or_broadcast(sender);
        let text = channel::encode(&sender, data)?;
        self.link.send(text).map_err(|err| {
            self.hooks.emit(&Event::Error(err.clone()));
            err
        })
    }

    /// Wrap `payload` in the bus envelope of `namespace` and send it.
    pub(crate) fn send_bus(
        &mut self,
        namespace: &str,
        payload: Value,
        sender: Option<&SenderId>,
    ) -> Result<Delivery, Error> {
        let data = match self.buses.get(namespace) {
            Some(bus) => bus.envelope(payload).encode()?,
            None => return Err(Error::UnknownNamespace(namespace.to_owned())),
        };
        self.send(&data, sender)
    }

    pub(crate) fn tick(&mut self) {
        for err in self.link.tick() {
            self.hooks.emit(&Event::Error(err));
        }
    }

    /// Apply a socket event. Returns the error if the socket failed, in which
    /// case the channel is no longer usable.
    pub(crate) fn handle(&mut self, id: &SocketId, kind: SocketEventKind) -> Option<Error> {
        match self.link.handle(id, kind)? {
            LinkEvent::Opened => {
                self.hooks.emit(&Event::Open);
                None
            }
            LinkEvent::Message(text) => {
                self.receive(&text);
                None
            }
            LinkEvent::Closed => {
                self.hooks.emit(&Event::Close);
                None
            }
            LinkEvent::Failed(message) => {
                let err = Error::Socket(message);
                self.hooks.emit(&Event::Error(err.clone()));
                Some(err)
            }
        }
    }

    fn receive(&mut self, text: &str) {
        let response = match Response::parse(text) {
            Ok(response) => response,
            Err(err) => {
                warn!("message channel [{}] undecodable frame: {}", self.id, err);
                return;
            }
        };
        match response {
            Response::SenderConnected(sender) => {
                info!("message channel [{}] {} connected", self.id, sender);
                if self.senders.connect(sender.clone()) {
                    self.hooks.emit(&Event::SenderConnected(sender.clone()));
                }
                for bus in self.buses.values_mut() {
                    bus.sender_connected(&sender);
                }
            }
            Response::SenderDisconnected(sender) => {
                info!("message channel [{}] {} left", self.id, sender);
                if self.senders.disconnect(&sender) {
                    self.hooks.emit(&Event::SenderDisconnected(sender.clone()));
                }
                for bus in self.buses.values_mut() {
                    bus.sender_disconnected(&sender);
                }
            }
            Response::Message { sender, data } => {
                if self.hooks.is_registered(EventKind::Message) {
                    self.hooks.emit(&Event::Message {
                        sender: sender.clone(),
                        payload: data.clone(),
                    });
                }
                match Envelope::decode(&data) {
                    Ok(envelope) => match self.buses.get_mut(&envelope.namespace) {
                        Some(bus) => bus.deliver(sender, envelope.payload),
                        None => trace!(
                            "message channel [{}] no bus for namespace {}",
                            self.id,
                            envelope.namespace
                        ),
                    },
                    Err(err) => debug!(
                        "message channel [{}] message without bus envelope: {}",
                        self.id, err
                    ),
                }
            }
            Response::Unknown(kind) => {
                warn!("message channel [{}] unknown message type {}", self.id, kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::testing::{event, message, Recorder};

    fn open_channel(recorder: &mut Recorder) -> (MessageChannel, SocketId) {
        let mut channel = MessageChannel::new("main", &Config::default()).unwrap();
        channel.open(recorder);
        let id = recorder.latest(&Endpoint::Channel("main".to_owned()));
        channel.handle(&id, SocketEventKind::Opened);
        (channel, id)
    }

    fn record(bus: &mut MessageBus, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bus.on(kind, move |event| log.lock().unwrap().push(event.clone()));
        seen
    }

    fn deliver(channel: &mut MessageChannel, id: &SocketId, json: Value) {
        let event = message(id, json);
        channel.handle(&event.id, event.kind);
    }

    #[test]
    fn create_message_bus_is_idempotent() {
        let mut channel = MessageChannel::new("main", &Config::default()).unwrap();
        let first = channel.create_message_bus("ns.demo").unwrap() as *const MessageBus;
        let second = channel.create_message_bus("ns.demo").unwrap() as *const MessageBus;
        assert_eq!(first, second);
        assert_eq!(vec!["ns.demo".to_owned()], channel.namespaces());
    }

    #[test]
    fn empty_namespace_creates_nothing() {
        let mut channel = MessageChannel::new("main", &Config::default()).unwrap();
        assert_eq!(
            Error::MissingNamespace,
            channel.create_message_bus("").unwrap_err()
        );
        assert!(channel.namespaces().is_empty());
    }

    #[test]
    fn dispatches_by_namespace() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        let demo = record(
            channel.create_message_bus("ns.demo").unwrap(),
            EventKind::Message,
        );
        let other = record(
            channel.create_message_bus("ns.other").unwrap(),
            EventKind::Message,
        );
        let envelope = json!({"namespace": "ns.demo", "payload": {"n": 1}});
        deliver(
            &mut channel,
            &id,
            json!({"type": "message", "senderId": "s1", "data": envelope.to_string()}),
        );
        assert_eq!(
            vec![Event::Message {
                sender: SenderId::from("s1"),
                payload: json!({"n": 1}),
            }],
            *demo.lock().unwrap()
        );
        assert!(other.lock().unwrap().is_empty());
    }

    #[test]
    fn unregistered_namespace_is_dropped() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        let demo = record(
            channel.create_message_bus("ns.demo").unwrap(),
            EventKind::Message,
        );
        let errors = Arc::new(Mutex::new(0));
        let count = Arc::clone(&errors);
        channel.on(EventKind::Error, move |_| *count.lock().unwrap() += 1);
        deliver(
            &mut channel,
            &id,
            json!({"type": "message", "senderId": "s1", "data": {"namespace": "foo", "payload": 1}}),
        );
        assert!(demo.lock().unwrap().is_empty());
        assert_eq!(0, *errors.lock().unwrap());
        assert!(recorder.sent(&id).is_empty());
    }

    #[test]
    fn presence_fans_out_to_every_bus() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        let demo = record(
            channel.create_message_bus("ns.demo").unwrap(),
            EventKind::SenderConnected,
        );
        let other = record(
            channel.create_message_bus("ns.other").unwrap(),
            EventKind::SenderConnected,
        );
        let connected = json!({"type": "senderConnected", "senderId": "s1"});
        deliver(&mut channel, &id, connected.clone());
        deliver(&mut channel, &id, connected);
        let expected = vec![Event::SenderConnected(SenderId::from("s1"))];
        assert_eq!(expected, *demo.lock().unwrap());
        assert_eq!(expected, *other.lock().unwrap());
        assert_eq!(1, channel.sender_count());

        deliver(
            &mut channel,
            &id,
            json!({"type": "senderDisconnected", "senderId": "s1"}),
        );
        assert_eq!(0, channel.sender_count());
        assert_eq!(0, channel.message_bus("ns.demo").unwrap().sender_count());
    }

    #[test]
    fn late_bus_sees_existing_senders() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        deliver(
            &mut channel,
            &id,
            json!({"type": "senderConnected", "senderId": "s1"}),
        );
        let bus = channel.create_message_bus("ns.late").unwrap();
        assert_eq!(vec![SenderId::from("s1")], bus.senders());
    }

    #[test]
    fn bus_send_round_trips() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        channel.create_message_bus("ns.demo").unwrap();
        let payload = json!({"text": "hello", "list": [1, 2, 3]});
        let sender = SenderId::from("s9");
        assert_eq!(
            Ok(Delivery::Sent),
            channel.send_bus("ns.demo", payload.clone(), Some(&sender))
        );

        // Feed the frame back as the paired endpoint would see it.
        let sent = recorder.sent_json(&id).remove(0);
        assert_eq!(json!("s9"), sent["senderId"]);
        let seen = record(
            channel.message_bus_mut("ns.demo").unwrap(),
            EventKind::Message,
        );
        deliver(
            &mut channel,
            &id,
            json!({"type": "message", "senderId": sent["senderId"], "data": sent["data"]}),
        );
        assert_eq!(vec![Event::Message { sender, payload }], *seen.lock().unwrap());
    }

    #[test]
    fn send_without_sender_broadcasts() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        channel.send(&json!("raw"), None).unwrap();
        assert_eq!(
            vec![json!({"senderId": "*:*", "data": "raw"})],
            recorder.sent_json(&id)
        );
    }

    #[test]
    fn send_to_unknown_namespace_fails() {
        let mut recorder = Recorder::default();
        let (mut channel, _) = open_channel(&mut recorder);
        assert_eq!(
            Err(Error::UnknownNamespace("ns.none".to_owned())),
            channel.send_bus("ns.none", json!(1), None)
        );
    }

    #[test]
    fn socket_error_is_reported() {
        let mut recorder = Recorder::default();
        let (mut channel, id) = open_channel(&mut recorder);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&errors);
        channel.on(EventKind::Error, move |event| {
            log.lock().unwrap().push(event.clone())
        });
        let failure = event(&id, SocketEventKind::Errored("reset".to_owned()));
        assert_eq!(
            Some(Error::Socket("reset".to_owned())),
            channel.handle(&failure.id, failure.kind)
        );
        assert_eq!(ConnectionState::Closed, channel.state());

        let err = channel.send(&json!(1), None).unwrap_err();
        assert_eq!(
            vec![
                Event::Error(Error::Socket("reset".to_owned())),
                Event::Error(err),
            ],
            *errors.lock().unwrap()
        );
    }

    #[test]
    fn expired_send_reaches_error_hook() {
        let mut recorder = Recorder::default();
        let config = Config {
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            ..Config::default()
        };
        let mut channel = MessageChannel::new("main", &config).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&errors);
        channel.on(EventKind::Error, move |event| {
            log.lock().unwrap().push(event.clone())
        });
        channel.open(&mut recorder);
        assert_eq!(Ok(Delivery::Deferred), channel.send(&json!("late"), None));
        channel.tick();
        assert!(errors.lock().unwrap().is_empty());
        channel.tick();
        assert_eq!(
            vec![Event::Error(Error::SendExpired {
                endpoint: "message channel [main]".to_owned(),
                attempts: 2,
            })],
            *errors.lock().unwrap()
        );
        let id = recorder.latest(&Endpoint::Channel("main".to_owned()));
        channel.handle(&id, SocketEventKind::Opened);
        assert!(recorder.sent(&id).is_empty());
    }
}
