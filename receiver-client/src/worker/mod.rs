mod dispatch;
mod socket;

pub use self::dispatch::task as run;
pub(crate) use self::socket::WsConnector;

use crate::transport::SocketEvent;

#[derive(Debug)]
pub(crate) enum Input {
    Socket(SocketEvent),
    Shutdown,
}
