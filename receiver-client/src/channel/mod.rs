pub mod bus;
pub mod control;
pub mod link;
pub mod message;

pub use self::bus::{BusAddress, MessageBus};
pub use self::control::{AppRegistration, ControlChannel, CHANNEL_BASE_URL_KEY};
pub use self::link::Delivery;
pub use self::message::MessageChannel;
