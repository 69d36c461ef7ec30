#[macro_use]
extern crate log;

use std::process;
use std::time::Duration;

use clap::Parser;
use futures::Future;
use receiver_client::{
    Client, Config, Error, Event, EventKind, Manager, MessageChannel, RetryPolicy,
    DEFAULT_CHANNEL_PORT, DEFAULT_CONTROL_PORT, DEFAULT_HOST,
};
use serde_json::Value;
use tokio::runtime::Runtime;

/// Register a receiver app with the local casting daemon and echo every
/// message back to the sender that sent it.
#[derive(Debug, Parser)]
#[command(name = "fling-receiver", version)]
struct Args {
    /// Application id to register with the daemon.
    #[arg(long)]
    app_id: String,

    /// Message channel to open. Repeatable; defaults to a single "main" channel.
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Message bus namespace to create on every channel. Repeatable.
    #[arg(long = "namespace")]
    namespaces: Vec<String>,

    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    #[arg(long, default_value_t = DEFAULT_CHANNEL_PORT)]
    channel_port: u16,

    /// Delay between retries of sends queued while connecting.
    #[arg(long, default_value_t = 50)]
    retry_ms: u64,

    /// Retries before a queued send is dropped.
    #[arg(long, default_value_t = 100)]
    max_attempts: u32,

    /// JSON advertised to senders instead of the channel urls.
    #[arg(long, value_parser = parse_json)]
    additional_data: Option<Value>,
}

fn parse_json(arg: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(arg)
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let manager = match build(&args) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("fling-receiver: {}", err);
            process::exit(1);
        }
    };
    let mut runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("fling-receiver: cannot start tokio runtime: {}", err);
            process::exit(1);
        }
    };
    let result = runtime.block_on(receiver_client::run(manager));
    let _ = runtime.shutdown_now().wait();
    if result.is_err() {
        process::exit(1);
    }
}

fn build(args: &Args) -> Result<Manager, Error> {
    let config = Config {
        host: args.host.clone(),
        control_port: args.control_port,
        channel_port: args.channel_port,
        retry: RetryPolicy {
            interval: Duration::from_millis(args.retry_ms),
            max_attempts: args.max_attempts,
        },
        ..Config::default()
    };
    let mut manager = Manager::new(&args.app_id, config)?;
    let client = manager.client();
    manager
        .on(EventKind::Open, |_| info!("control channel open"))
        .on(EventKind::Close, |_| info!("control channel closed"))
        .on(EventKind::Error, |event| warn!("control channel: {:?}", event))
        .on(EventKind::SenderConnected, |event| info!("{:?}", event))
        .on(EventKind::SenderDisconnected, |event| info!("{:?}", event))
        .on(EventKind::ChannelLost, |event| error!("{:?}", event));

    let channels = if args.channels.is_empty() {
        vec![None]
    } else {
        args.channels.iter().map(|id| Some(id.as_str())).collect()
    };
    for id in channels {
        let channel = manager.create_channel(id)?;
        echo(channel, &args.namespaces, &client)?;
    }
    if let Some(ref data) = args.additional_data {
        manager.set_additional_data(data.clone());
    }
    Ok(manager)
}

/// Echo on every bus, or on the raw channel when there are no namespaces.
fn echo(channel: &mut MessageChannel, namespaces: &[String], client: &Client) -> Result<(), Error> {
    let id = channel.id().to_owned();
    channel.on(EventKind::Error, {
        let id = id.clone();
        move |event| warn!("message channel [{}]: {:?}", id, event)
    });
    if namespaces.is_empty() {
        let client = client.clone();
        channel.on(EventKind::Message, move |event| {
            if let Event::Message { sender, payload } = event {
                client.send_channel(&id, payload.clone(), Some(sender.clone()));
            }
        });
        return Ok(());
    }
    for namespace in namespaces {
        let bus = channel.create_message_bus(namespace)?;
        let address = bus.address().clone();
        let client = client.clone();
        bus.on(EventKind::SenderConnected, |event| debug!("bus {:?}", event))
            .on(EventKind::SenderDisconnected, |event| debug!("bus {:?}", event))
            .on(EventKind::Message, move |event| {
                if let Event::Message { sender, payload } = event {
                    info!("{} message from {}: {}", address, sender, payload);
                    client.send(&address, payload.clone(), Some(sender.clone()));
                }
            });
    }
    Ok(())
}
