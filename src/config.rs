use std::collections::BTreeMap as Map;
use std::fmt;
use std::time::Duration;

use frpsync::{
    client::Credentials,
    codec::Proxies,
    proxy::{Fields, REDACTED},
};

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct Config {
    pub fleet: Fleet,

    /// Seconds between two periodic reconciliation passes.
    #[serde(default = "defaults::sync_interval")]
    pub sync_interval: u64,

    /// Values forced in every member's `[common]` section.
    #[serde(default)]
    pub common: Fields,

    /// Static proxies, by owner then by name.
    #[serde(default)]
    pub proxies: Map<String, Proxies>,
}

impl Config {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
pub struct Fleet {
    /// DNS name resolving to every member of the fleet.
    pub host: String,
    #[serde(default = "defaults::admin_port")]
    pub admin_port: u16,
    pub admin_user: String,
    #[serde(default)]
    pub admin_password: String,

    /// Seconds before an admin request is abandoned.
    #[serde(default = "defaults::request_timeout")]
    pub request_timeout: u64,
    /// Seconds between two resolutions of `host`.
    #[serde(default = "defaults::resolve_interval")]
    pub resolve_interval: u64,
}

impl fmt::Debug for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fleet")
            .field("host", &self.host)
            .field("admin_port", &self.admin_port)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &REDACTED)
            .field("request_timeout", &self.request_timeout)
            .field("resolve_interval", &self.resolve_interval)
            .finish()
    }
}

impl Fleet {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.admin_user.clone(),
            password: self.admin_password.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval)
    }
}

mod defaults {
    pub fn admin_port() -> u16 {
        7400
    }
    pub fn request_timeout() -> u64 {
        10
    }
    pub fn resolve_interval() -> u64 {
        10
    }
    pub fn sync_interval() -> u64 {
        60
    }
}
