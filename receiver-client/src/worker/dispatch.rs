use futures::prelude::*;
use futures::sync::mpsc::unbounded;
use futures::{future, stream, Future};
use tokio_timer::Interval;

use super::{Input, WsConnector};
use crate::{Command, Manager, Snapshot};

#[derive(Debug)]
enum Step {
    Input(Input),
    Command(Command),
    Tick,
}

/// Open the manager and drive it from socket events, client commands and the
/// retry interval until the control connection is gone.
pub fn task(mut manager: Manager) -> impl Future<Item = (), Error = ()> {
    future::lazy(move || {
        let (events_tx, events_rx) = unbounded();
        let commands: Box<dyn Stream<Item = Command, Error = ()> + Send> =
            match manager.take_commands() {
                Some(commands) => Box::new(commands),
                None => {
                    error!("receiver manager commands are already consumed");
                    Box::new(stream::empty())
                }
            };
        let ticks = Interval::new_interval(manager.config().retry.interval)
            .map(|_| Step::Tick)
            .map_err(|err| warn!("Error on retry interval: {:?}", err));
        let steps = events_rx
            .map(Step::Input)
            .select(commands.map(Step::Command))
            .select(ticks)
            .take_while(|step| match step {
                Step::Input(Input::Shutdown) => Ok(false),
                _ => Ok(true),
            });

        let mut connector = WsConnector::new(events_tx.clone());
        if let Err(err) = manager.open(&mut connector) {
            warn!("receiver manager open failed: {}", err);
        }
        let published = manager.published();
        let mut last = Snapshot::default();
        steps.for_each(move |step| {
            match step {
                Step::Input(Input::Socket(event)) => manager.handle(event),
                Step::Input(Input::Shutdown) => {}
                Step::Command(command) => manager.execute(command),
                Step::Tick => manager.tick(),
            }
            if manager.is_finished() {
                info!("receiver manager {} finished", manager.app_id());
                let _ = events_tx.unbounded_send(Input::Shutdown);
            }
            let snapshot = manager.snapshot();
            if snapshot == last {
                return future::Either::A(future::ok(()));
            }
            last = snapshot.clone();
            future::Either::B(
                published
                    .write()
                    .map(move |mut current| *current = snapshot),
            )
        })
    })
}
