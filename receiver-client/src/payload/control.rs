//! The control channel registers the receiver app with the daemon, keeps the
//! registration alive and reports sender presence.

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::SenderId;

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Register,
    Unregister,
    AdditionalData { additionaldata: Value },
    Heartbeat { heartbeat: Beat },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Beat {
    Ping,
    Pong,
}

impl Beat {
    /// Heartbeats are echoed: a ping is answered with a pong and vice versa.
    pub fn echo(self) -> Self {
        match self {
            Beat::Ping => Beat::Pong,
            Beat::Pong => Beat::Ping,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ping" => Some(Beat::Ping),
            "pong" => Some(Beat::Pong),
            _ => None,
        }
    }
}

/// Every request is sent with the id of the app it belongs to.
#[derive(Serialize, Debug)]
pub struct Stamped<'a> {
    #[serde(flatten)]
    pub request: &'a Request,
    pub appid: &'a str,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    RegisterOk {
        service_info: ServiceInfo,
    },
    Heartbeat {
        #[serde(default)]
        heartbeat: Option<String>,
    },
    SenderConnected {
        token: SenderId,
    },
    SenderDisconnected {
        token: SenderId,
    },
    StartHeartbeat,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ServiceInfo {
    #[serde(default)]
    pub ip: Vec<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
}

pub fn encode(request: &Request, appid: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Stamped { request, appid })
}
