use serde_json::{Map, Value};

use crate::channel::link::{Delivery, Link, LinkEvent};
use crate::config::{self, Config};
use crate::hooks::{Event, EventKind, Hooks};
use crate::payload::control::{self, Beat, Request, Response, ServiceInfo};
use crate::presence::Presence;
use crate::transport::{Connector, Endpoint, SocketEventKind, SocketId};
use crate::{ChannelId, ConnectionState, Error, SenderId};

/// Additional-data key used when the app declares a single channel.
pub const CHANNEL_BASE_URL_KEY: &str = "channelBaseUrl";

/// What the daemon knows about this receiver app.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppRegistration {
    app_id: String,
    additional_data: Option<Value>,
    daemon_address: Option<String>,
    device_uuid: Option<String>,
    device_name: Option<String>,
}

impl AppRegistration {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn additional_data(&self) -> Option<&Value> {
        self.additional_data.as_ref()
    }

    /// Address of the daemon as reported in the registration acknowledgement.
    pub fn daemon_address(&self) -> Option<&str> {
        self.daemon_address.as_ref().map(String::as_str)
    }

    pub fn device_uuid(&self) -> Option<&str> {
        self.device_uuid.as_ref().map(String::as_str)
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_ref().map(String::as_str)
    }

    pub fn is_registered(&self) -> bool {
        self.daemon_address.is_some()
    }
}

/// Connection to the daemon's control endpoint. Runs the register and
/// heartbeat protocol and tracks which senders are connected to the app.
#[derive(Debug)]
pub struct ControlChannel {
    registration: AppRegistration,
    channel_port: u16,
    link: Link,
    senders: Presence,
    hooks: Hooks,
}

impl ControlChannel {
    pub(crate) fn new(app_id: &str, config: &Config) -> Result<Self, Error> {
        let url = config.control_url(app_id)?;
        Ok(Self {
            registration: AppRegistration {
                app_id: app_id.to_owned(),
                ..AppRegistration::default()
            },
            channel_port: config.channel_port,
            link: Link::new(Endpoint::Control, url, config.retry),
            senders: Presence::default(),
            hooks: Hooks::default(),
        })
    }

    pub fn registration(&self) -> &AppRegistration {
        &self.registration
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn senders(&self) -> &Presence {
        &self.senders
    }

    pub(crate) fn on<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.hooks.on(kind, callback);
    }

    pub(crate) fn emit(&mut self, event: &Event) {
        self.hooks.emit(event);
    }

    pub(crate) fn open(&mut self, connector: &mut dyn Connector) -> bool {
        self.link.open(connector)
    }

    /// Tell the daemon the app is going away. Skipped unless the socket is
    /// open.
    pub(crate) fn unregister(&mut self) {
        if self.link.state() == ConnectionState::Open {
            let _ = self.send(&Request::Unregister);
        } else {
            debug!("control channel not open, skipping unregister");
        }
    }

    pub(crate) fn close(&mut self) {
        self.link.close();
    }

    pub(crate) fn set_additional_data(&mut self, data: Value) {
        info!("set additionaldata to: {}", data);
        self.registration.additional_data = Some(data.clone());
        if self.registration.is_registered() {
            self.announce(data);
        }
    }

    pub(crate) fn send(&mut self, request: &Request) -> Result<Delivery, Error> {
        let text = control::encode(request, &self.registration.app_id)?;
        self.link.send(text).map_err(|err| {
            self.hooks.emit(&Event::Error(err.clone()));
            err
        })
    }

    pub(crate) fn tick(&mut self) {
        for err in self.link.tick() {
            self.hooks.emit(&Event::Error(err));
        }
    }

    /// Apply a socket event. `channels` are the ids of the app's message
    /// channels, advertised to senders once registration completes.
    pub(crate) fn handle(
        &mut self,
        id: &SocketId,
        kind: SocketEventKind,
        channels: &[ChannelId],
    ) {
        match self.link.handle(id, kind) {
            Some(LinkEvent::Opened) => {
                let _ = self.send(&Request::Register);
                self.hooks.emit(&Event::Open);
            }
            Some(LinkEvent::Message(text)) => self.receive(&text, channels),
            Some(LinkEvent::Closed) => {
                self.hooks.emit(&Event::Close);
            }
            Some(LinkEvent::Failed(message)) => {
                self.hooks.emit(&Event::Error(Error::Socket(message)));
            }
            None => {}
        }
    }

    fn receive(&mut self, text: &str, channels: &[ChannelId]) {
        let response = match serde_json::from_str::<Response>(text) {
            Ok(response) => response,
            Err(err) => {
                warn!("control channel undecodable message: {}: {}", err, text);
                return;
            }
        };
        trace!("control channel got {:?}", response);
        match response {
            Response::RegisterOk { service_info } => self.registered(service_info, channels),
            Response::Heartbeat { heartbeat } => self.heartbeat(heartbeat),
            Response::SenderConnected { token } => self.sender_connected(token),
            Response::SenderDisconnected { token } => self.sender_disconnected(&token),
            Response::StartHeartbeat => info!("receiver ready to start heartbeat"),
            Response::Unknown => warn!("unknown control message: {}", text),
        }
    }

    fn registered(&mut self, service_info: ServiceInfo, channels: &[ChannelId]) {
        let ServiceInfo {
            ip,
            uuid,
            device_name,
        } = service_info;
        let address = match ip.into_iter().next() {
            Some(address) => address,
            None => {
                warn!("registerok without a daemon address");
                return;
            }
        };
        info!("receiver register done, daemon at {}", address);
        self.registration.daemon_address = Some(address);
        self.registration.device_uuid = uuid;
        self.registration.device_name = device_name;

        let announcement = match self.registration.additional_data.clone() {
            Some(data) => Some(data),
            None => self.channel_urls(channels),
        };
        if let Some(data) = announcement {
            self.announce(data);
        }
    }

    /// Tell senders where to reach the app's message channels.
    fn channel_urls(&self, channels: &[ChannelId]) -> Option<Value> {
        let address = self.registration.daemon_address()?;
        let port = self.channel_port;
        let url = |id: &str| Value::String(config::channel_base_url(address, port, id));
        let mut urls = Map::new();
        match channels {
            [] => return None,
            [only] => {
                urls.insert(CHANNEL_BASE_URL_KEY.to_owned(), url(only.as_str()));
            }
            many => {
                for id in many {
                    urls.insert(id.clone(), url(id.as_str()));
                }
            }
        }
        Some(Value::Object(urls))
    }

    fn announce(&mut self, data: Value) {
        let _ = self.send(&Request::AdditionalData {
            additionaldata: data,
        });
    }

    fn heartbeat(&mut self, value: Option<String>) {
        match value.as_ref().and_then(|value| Beat::parse(value)) {
            Some(beat) => {
                let _ = self.send(&Request::Heartbeat {
                    heartbeat: beat.echo(),
                });
            }
            None => warn!("unknown heartbeat message: {:?}", value),
        }
    }

    fn sender_connected(&mut self, sender: SenderId) {
        if self.senders.connect(sender.clone()) {
            info!("sender {} connected", sender);
            self.hooks.emit(&Event::SenderConnected(sender));
        } else {
            debug!("sender {} already connected", sender);
        }
    }

    fn sender_disconnected(&mut self, sender: &SenderId) {
        if self.senders.disconnect(sender) {
            info!("sender {} disconnected", sender);
            self.hooks.emit(&Event::SenderDisconnected(sender.clone()));
        } else {
            debug!("sender {} was not connected", sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::testing::{event, message, Recorder};

    fn open_control(recorder: &mut Recorder) -> (ControlChannel, SocketId) {
        let mut control = ControlChannel::new("app1", &Config::default()).unwrap();
        control.open(recorder);
        let id = recorder.latest(&Endpoint::Control);
        let opened = event(&id, SocketEventKind::Opened);
        control.handle(&opened.id, opened.kind, &[]);
        (control, id)
    }

    fn receive(control: &mut ControlChannel, id: &SocketId, json: Value, channels: &[ChannelId]) {
        let event = message(id, json);
        control.handle(&event.id, event.kind, channels);
    }

    fn registerok(ip: &[&str]) -> Value {
        json!({"type": "registerok", "service_info": {"ip": ip}})
    }

    #[test]
    fn registers_on_open() {
        let mut recorder = Recorder::default();
        let (control, id) = open_control(&mut recorder);
        assert_eq!(
            vec![json!({"type": "register", "appid": "app1"})],
            recorder.sent_json(&id)
        );
        assert!(!control.registration().is_registered());
    }

    #[test]
    fn heartbeat_is_echoed() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        receive(&mut control, &id, json!({"type": "heartbeat", "heartbeat": "ping"}), &[]);
        receive(&mut control, &id, json!({"type": "heartbeat", "heartbeat": "pong"}), &[]);
        receive(&mut control, &id, json!({"type": "heartbeat", "heartbeat": "pang"}), &[]);
        receive(&mut control, &id, json!({"type": "heartbeat"}), &[]);
        let sent = recorder.sent_json(&id);
        assert_eq!(
            vec![
                json!({"type": "heartbeat", "heartbeat": "pong", "appid": "app1"}),
                json!({"type": "heartbeat", "heartbeat": "ping", "appid": "app1"}),
            ],
            sent[1..].to_vec()
        );
    }

    #[test]
    fn registerok_with_single_channel_announces_base_url() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        receive(&mut control, &id, registerok(&["10.0.0.5"]), &["main".to_owned()]);
        assert_eq!(Some("10.0.0.5"), control.registration().daemon_address());
        assert_eq!(
            json!({
                "type": "additionaldata",
                "additionaldata": {"channelBaseUrl": "ws://10.0.0.5:9439/channels/main"},
                "appid": "app1",
            }),
            recorder.sent_json(&id)[1]
        );
    }

    #[test]
    fn registerok_with_many_channels_announces_each() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        let channels = vec!["a".to_owned(), "b".to_owned()];
        receive(&mut control, &id, registerok(&["10.0.0.5"]), &channels);
        assert_eq!(
            json!({
                "a": "ws://10.0.0.5:9439/channels/a",
                "b": "ws://10.0.0.5:9439/channels/b",
            }),
            recorder.sent_json(&id)[1]["additionaldata"]
        );
    }

    #[test]
    fn registerok_without_channels_announces_nothing() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        receive(&mut control, &id, registerok(&["10.0.0.5"]), &[]);
        assert_eq!(1, recorder.sent(&id).len());
        assert!(control.registration().is_registered());
    }

    #[test]
    fn registerok_without_address_is_ignored() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        receive(&mut control, &id, registerok(&[]), &["main".to_owned()]);
        assert!(!control.registration().is_registered());
        assert_eq!(1, recorder.sent(&id).len());
    }

    #[test]
    fn additional_data_waits_for_registration() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        control.set_additional_data(json!({"custom": true}));
        assert_eq!(1, recorder.sent(&id).len());

        receive(&mut control, &id, registerok(&["10.0.0.5"]), &["main".to_owned()]);
        assert_eq!(
            json!({"custom": true}),
            recorder.sent_json(&id)[1]["additionaldata"]
        );

        control.set_additional_data(json!({"custom": false}));
        assert_eq!(
            json!({"custom": false}),
            recorder.sent_json(&id)[2]["additionaldata"]
        );
    }

    #[test]
    fn sender_presence_is_forwarded_once() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for &kind in &[EventKind::SenderConnected, EventKind::SenderDisconnected] {
            let log = Arc::clone(&seen);
            control.on(kind, move |event| log.lock().unwrap().push(event.clone()));
        }
        let connected = json!({"type": "senderconnected", "token": "t1"});
        receive(&mut control, &id, connected.clone(), &[]);
        receive(&mut control, &id, connected, &[]);
        assert_eq!(1, control.senders().len());
        receive(&mut control, &id, json!({"type": "senderdisconnected", "token": "t1"}), &[]);
        assert!(control.senders().is_empty());
        assert_eq!(
            vec![
                Event::SenderConnected(SenderId::from("t1")),
                Event::SenderDisconnected(SenderId::from("t1")),
            ],
            *seen.lock().unwrap()
        );
    }

    #[test]
    fn unknown_and_malformed_messages_are_dropped() {
        let mut recorder = Recorder::default();
        let (mut control, id) = open_control(&mut recorder);
        receive(&mut control, &id, json!({"type": "mystery"}), &[]);
        receive(&mut control, &id, json!({"type": "startheartbeat"}), &[]);
        let garbage = event(&id, SocketEventKind::Message("not json".to_owned()));
        control.handle(&garbage.id, garbage.kind, &[]);
        assert_eq!(1, recorder.sent(&id).len());
        assert_eq!(ConnectionState::Open, control.state());
    }

    #[test]
    fn unregister_requires_open_socket() {
        let mut recorder = Recorder::default();
        let mut control = ControlChannel::new("app1", &Config::default()).unwrap();
        control.unregister();
        control.open(&mut recorder);
        let id = recorder.latest(&Endpoint::Control);
        control.unregister();
        assert_eq!(0, control.link.pending());
        let opened = event(&id, SocketEventKind::Opened);
        control.handle(&opened.id, opened.kind, &[]);
        control.unregister();
        assert_eq!(
            json!({"type": "unregister", "appid": "app1"}),
            recorder.sent_json(&id)[1]
        );
    }
}
