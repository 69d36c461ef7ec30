use futures::prelude::*;
use futures::sync::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{future, Future};
use tokio_tungstenite::connect_async;
use tungstenite::{Error as WsError, Message};
use url::Url;

use super::Input;
use crate::transport::{Connector, Socket, SocketEvent, SocketEventKind, SocketId};
use crate::{ConnectionState, Error};

/// Opens websockets on the default executor. Every socket reports back on the
/// shared `events` channel, tagged with its `SocketId`.
#[derive(Debug)]
pub(crate) struct WsConnector {
    events: UnboundedSender<Input>,
}

impl WsConnector {
    pub fn new(events: UnboundedSender<Input>) -> Self {
        Self { events }
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, id: SocketId, url: &Url) -> Box<dyn Socket> {
        info!("Connecting {} to {}", id.endpoint, url);
        let (outgoing, queue) = unbounded();
        tokio_executor::spawn(task(id.clone(), url.clone(), queue, self.events.clone()));
        Box::new(WsSocket {
            id,
            outgoing: Some(outgoing),
        })
    }
}

#[derive(Debug)]
struct WsSocket {
    id: SocketId,
    outgoing: Option<UnboundedSender<Message>>,
}

impl Socket for WsSocket {
    fn send(&mut self, text: String) -> Result<(), Error> {
        let endpoint = &self.id.endpoint;
        match self.outgoing {
            Some(ref outgoing) => outgoing
                .unbounded_send(Message::Text(text))
                .map_err(|_| Error::Socket(format!("{} writer is gone", endpoint))),
            None => Err(Error::TransportUnavailable {
                endpoint: endpoint.to_string(),
                state: ConnectionState::Closing,
            }),
        }
    }

    fn close(&mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            let _ = outgoing.unbounded_send(Message::Close(None));
        }
    }
}

fn report(events: &UnboundedSender<Input>, id: &SocketId, kind: SocketEventKind) {
    let event = SocketEvent::new(id.clone(), kind);
    if events.unbounded_send(Input::Socket(event)).is_err() {
        debug!("{} event after receiver shutdown", id.endpoint);
    }
}

fn task(
    id: SocketId,
    url: Url,
    queue: UnboundedReceiver<Message>,
    events: UnboundedSender<Input>,
) -> impl Future<Item = (), Error = ()> {
    connect_async(url).then(move |result| match result {
        Ok((stream, _)) => {
            info!("{} websocket established", id.endpoint);
            report(&events, &id, SocketEventKind::Opened);
            let (sink, source) = stream.split();
            tokio_executor::spawn(write(sink, queue));
            future::Either::A(read(source, id, events))
        }
        Err(err) => {
            warn!("{} connect failed: {}", id.endpoint, err);
            report(&events, &id, SocketEventKind::Errored(err.to_string()));
            future::Either::B(future::ok(()))
        }
    })
}

fn read(
    source: impl Stream<Item = Message, Error = WsError>,
    id: SocketId,
    events: UnboundedSender<Input>,
) -> impl Future<Item = (), Error = ()> {
    let inbound = events.clone();
    let inbound_id = id.clone();
    source
        .for_each(move |message| {
            match message {
                Message::Text(text) => {
                    report(&inbound, &inbound_id, SocketEventKind::Message(text))
                }
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => report(&inbound, &inbound_id, SocketEventKind::Message(text)),
                    Err(_) => warn!("{} dropping non-utf8 frame", inbound_id.endpoint),
                },
                Message::Close(frame) => debug!("{} close frame {:?}", inbound_id.endpoint, frame),
                _ => {}
            }
            Ok(())
        })
        .then(move |result| {
            let kind = match result {
                Ok(()) => SocketEventKind::Closed,
                Err(err) => {
                    warn!("Error on {} read: {}", id.endpoint, err);
                    SocketEventKind::Errored(err.to_string())
                }
            };
            report(&events, &id, kind);
            Ok(())
        })
}

fn write(
    sink: impl Sink<SinkItem = Message, SinkError = WsError>,
    queue: impl Stream<Item = Message, Error = ()>,
) -> impl Future<Item = (), Error = ()> {
    queue
        .forward(sink.sink_map_err(|err| warn!("Error on socket write: {:?}", err)))
        .map(|_| ())
}
