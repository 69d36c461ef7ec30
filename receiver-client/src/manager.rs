use std::collections::BTreeMap;

use futures::sync::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_locks::RwLock;
use serde_json::Value;

use crate::channel::{AppRegistration, BusAddress, ControlChannel, Delivery, MessageBus, MessageChannel};
use crate::hooks::{Event, EventKind};
use crate::transport::{Connector, Endpoint, SocketEvent};
use crate::{ChannelId, Client, Command, Config, ConnectionState, Error, SenderId};

/// Read-only copy of the manager's registries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub state: ConnectionState,
    pub daemon_address: Option<String>,
    pub device_uuid: Option<String>,
    pub device_name: Option<String>,
    pub senders: Vec<SenderId>,
    pub channels: Vec<ChannelId>,
}

/// Composition root of a receiver app: owns the control channel and every
/// message channel, and is driven by socket events, retry ticks and
/// application commands.
#[derive(Debug)]
pub struct Manager {
    config: Config,
    control: ControlChannel,
    channels: BTreeMap<ChannelId, MessageChannel>,
    opened: bool,
    command_tx: UnboundedSender<Command>,
    command_rx: Option<UnboundedReceiver<Command>>,
    published: RwLock<Snapshot>,
}

impl Manager {
    pub fn new(app_id: &str, config: Config) -> Result<Self, Error> {
        if app_id.is_empty() {
            error!("appid must be set before opening the receiver");
            return Err(Error::MissingAppId);
        }
        let control = ControlChannel::new(app_id, &config)?;
        let (command_tx, command_rx) = unbounded();
        Ok(Self {
            config,
            control,
            channels: BTreeMap::new(),
            opened: false,
            command_tx,
            command_rx: Some(command_rx),
            published: RwLock::new(Snapshot::default()),
        })
    }

    pub fn app_id(&self) -> &str {
        self.control.registration().app_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registration(&self) -> &AppRegistration {
        self.control.registration()
    }

    /// State of the control connection.
    pub fn state(&self) -> ConnectionState {
        self.control.state()
    }

    pub fn is_started(&self) -> bool {
        self.control.state().is_active()
    }

    /// The control connection has gone away after `open`.
    pub fn is_finished(&self) -> bool {
        self.opened && self.control.state() == ConnectionState::Closed
    }

    /// A handle for queueing commands from application hooks or other tasks.
    pub fn client(&self) -> Client {
        Client::new(self.command_tx.clone(), self.published.clone())
    }

    /// Register a manager-level callback: `Open`, `Close`, `Error`,
    /// `SenderConnected`, `SenderDisconnected` or `ChannelLost`.
    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> &mut Self
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.control.on(kind, callback);
        self
    }

    /// Declare a message channel. Channels must be created before `open`; a
    /// missing id selects the configured default channel.
    pub fn create_channel(&mut self, id: Option<&str>) -> Result<&mut MessageChannel, Error> {
        if self.is_started() {
            error!("receiver manager is started, cannot create new message channel");
            return Err(Error::AlreadyStarted);
        }
        let id = id
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| self.config.default_channel_id.clone());
        if self.channels.contains_key(&id) {
            error!("duplicated message channel id: {}", id);
            return Err(Error::DuplicateChannel(id));
        }
        let channel = MessageChannel::new(&id, &self.config)?;
        debug!("created message channel [{}] at {}", id, channel.url());
        Ok(self.channels.entry(id).or_insert(channel))
    }

    pub fn channel(&self, id: &str) -> Option<&MessageChannel> {
        self.channels.get(id)
    }

    pub fn channel_mut(&mut self, id: &str) -> Option<&mut MessageChannel> {
        self.channels.get_mut(id)
    }

    pub fn create_message_bus(
        &mut self,
        channel: &str,
        namespace: &str,
    ) -> Result<&mut MessageBus, Error> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| Error::UnknownChannel(channel.to_owned()))?
            .create_message_bus(namespace)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.channels.keys().cloned().collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Senders connected to the app, as reported on the control channel.
    pub fn senders(&self) -> Vec<SenderId> {
        self.control.senders().snapshot()
    }

    pub fn sender_count(&self) -> usize {
        self.control.senders().len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            daemon_address: self.registration().daemon_address().map(str::to_owned),
            device_uuid: self.registration().device_uuid().map(str::to_owned),
            device_name: self.registration().device_name().map(str::to_owned),
            senders: self.senders(),
            channels: self.channels(),
        }
    }

    /// Open every message channel, then register with the daemon.
    pub fn open(&mut self, connector: &mut dyn Connector) -> Result<(), Error> {
        if self.is_started() {
            warn!(
                "control channel state is {}, cannot reopen",
                self.control.state()
            );
            return Err(Error::AlreadyStarted);
        }
        for channel in self.channels.values_mut() {
            channel.open(connector);
        }
        self.control.open(connector);
        self.opened = true;
        Ok(())
    }

    /// Unregister from the daemon and close every connection.
    pub fn close(&mut self) {
        info!("closing receiver manager {}", self.app_id());
        self.control.unregister();
        for channel in self.channels.values_mut() {
            channel.close();
        }
        self.control.close();
    }

    pub fn set_additional_data(&mut self, data: Value) {
        self.control.set_additional_data(data);
    }

    pub fn send(
        &mut self,
        bus: &BusAddress,
        payload: Value,
        sender: Option<&SenderId>,
    ) -> Result<Delivery, Error> {
        self.channels
            .get_mut(&bus.channel)
            .ok_or_else(|| Error::UnknownChannel(bus.channel.clone()))?
            .send_bus(&bus.namespace, payload, sender)
    }

    pub fn send_channel(
        &mut self,
        channel: &str,
        data: &Value,
        sender: Option<&SenderId>,
    ) -> Result<Delivery, Error> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| Error::UnknownChannel(channel.to_owned()))?
            .send(data, sender)
    }

    pub fn handle(&mut self, event: SocketEvent) {
        let SocketEvent { id, kind } = event;
        match &id.endpoint {
            Endpoint::Control => {
                let channels = self.channels();
                self.control.handle(&id, kind, &channels);
            }
            Endpoint::Channel(channel_id) => {
                let failure = match self.channels.get_mut(channel_id) {
                    Some(channel) => channel.handle(&id, kind),
                    None => {
                        debug!("event for evicted message channel [{}]", channel_id);
                        return;
                    }
                };
                if let Some(err) = failure {
                    self.evict(channel_id, &err);
                }
            }
        }
    }

    /// Retry sends queued while connecting.
    pub fn tick(&mut self) {
        self.control.tick();
        for channel in self.channels.values_mut() {
            channel.tick();
        }
    }

    pub fn execute(&mut self, command: Command) {
        trace!("executing {:?}", command);
        let result = match command {
            Command::SetAdditionalData(data) => {
                self.set_additional_data(data);
                return;
            }
            Command::Send {
                bus,
                payload,
                sender,
            } => self.send(&bus, payload, sender.as_ref()),
            Command::SendChannel {
                channel,
                data,
                sender,
            } => self.send_channel(&channel, &data, sender.as_ref()),
            Command::Close => {
                self.close();
                return;
            }
        };
        if let Err(err) = result {
            warn!("queued send failed: {}", err);
        }
    }

    pub(crate) fn take_commands(&mut self) -> Option<UnboundedReceiver<Command>> {
        self.command_rx.take()
    }

    pub(crate) fn published(&self) -> RwLock<Snapshot> {
        self.published.clone()
    }

    fn evict(&mut self, id: &str, err: &Error) {
        error!("message channel [{}] is broken: {}", id, err);
        self.channels.remove(id);
        self.control.emit(&Event::ChannelLost(id.to_owned()));
    }
}
