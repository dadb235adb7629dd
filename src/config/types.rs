//! Configuration Types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::crypto::DEFAULT_METHOD;

/// Main configuration structure
///
/// Field names follow the JSON files the relay has always read, so existing
/// `config.json` files load unchanged. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address every port listens on
    pub server: String,
    /// Default port, used when `port_password` is empty
    pub server_port: u16,
    /// Default password, used when `port_password` is empty
    pub password: String,
    /// Encryption method shared by every port
    pub method: String,
    /// Per-port passwords, keyed by port number as a string
    pub port_password: BTreeMap<String, String>,
    /// Request read deadline, dial timeout and relay idle timeout
    #[serde(with = "timeout_serde")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "0.0.0.0".to_string(),
            server_port: 0,
            password: String::new(),
            method: DEFAULT_METHOD.to_string(),
            port_password: BTreeMap::new(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Timeouts accept either plain seconds (`300`) or a humantime string (`"5m"`)
mod timeout_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimeout {
        Seconds(u64),
        Human(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawTimeout::deserialize(deserializer)? {
            RawTimeout::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawTimeout::Human(text) => {
                humantime::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime_serde::serialize(duration, serializer)
    }
}
