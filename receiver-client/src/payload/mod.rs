pub mod channel;
pub mod control;
