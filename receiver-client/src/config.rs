use std::time::Duration;

use url::Url;

use crate::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CONTROL_PORT: u16 = 9431;
pub const DEFAULT_CHANNEL_PORT: u16 = 9439;
pub const DEFAULT_CHANNEL_ID: &str = "main";

/// Sends issued while a socket is connecting are retried once per
/// `interval` until the socket opens, at most `max_attempts` times.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            max_attempts: 100,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Address of the daemon, as seen from the receiver.
    pub host: String,
    pub control_port: u16,
    pub channel_port: u16,
    /// Channel id used when `create_channel` is called without one.
    pub default_channel_id: String,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            control_port: DEFAULT_CONTROL_PORT,
            channel_port: DEFAULT_CHANNEL_PORT,
            default_channel_id: DEFAULT_CHANNEL_ID.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn control_url(&self, app_id: &str) -> Result<Url, Error> {
        let url = format!(
            "ws://{}:{}/receiver/{}",
            self.host, self.control_port, app_id
        );
        Url::parse(&url).map_err(|_| Error::InvalidUrl(url))
    }

    pub fn channel_url(&self, channel_id: &str) -> Result<Url, Error> {
        let url = channel_base_url(&self.host, self.channel_port, channel_id);
        Url::parse(&url).map_err(|_| Error::InvalidUrl(url))
    }
}

/// URL a sender uses to reach a data channel through the daemon at `host`.
pub fn channel_base_url(host: &str, port: u16, channel_id: &str) -> String {
    format!("ws://{}:{}/channels/{}", host, port, channel_id)
}
