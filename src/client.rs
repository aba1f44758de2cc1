use http::{Method, StatusCode};
use log::debug;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::codec::{self, Bundle, DecodeError, EncodeError};
use crate::proxy::REDACTED;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub mod fake;

/// One admin API call.
pub struct Api {
    pub method: Method,
    pub path: &'static str,
}

pub static GET_CONFIG: Api = Api {
    method: Method::GET,
    path: "/api/config",
};
pub static PUT_CONFIG: Api = Api {
    method: Method::PUT,
    path: "/api/config",
};
pub static RELOAD: Api = Api {
    method: Method::GET,
    path: "/api/reload",
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("unexpected status {0}: {1}")]
    StatusMessage(StatusCode, String),
    #[error("invalid config received: {0}")]
    Decode(#[from] DecodeError),
    #[error("config can't be sent: {0}")]
    Encode(#[from] EncodeError),
}

/// Access to one fleet member's admin API.
pub trait Client: Send + Sync + 'static {
    /// Canonical address of the member (the textual form of its IP). Used to
    /// match members across fleet updates and to qualify proxy names.
    fn address(&self) -> &str;

    /// Current configuration of the member.
    fn fetch(&self) -> impl Future<Output = Result<Bundle>> + Send;

    /// Replace the member's whole configuration.
    fn replace(&self, bundle: &Bundle) -> impl Future<Output = Result<()>> + Send;

    /// Make the member apply its configuration.
    fn reload(&self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &REDACTED)
            .finish()
    }
}

/// HTTP client of a member's admin API, using basic auth.
pub struct AdminClient {
    http: reqwest::Client,
    address: String,
    base_url: String,
    credentials: Credentials,
}

impl AdminClient {
    pub fn new(http: reqwest::Client, ip: IpAddr, port: u16, credentials: Credentials) -> Self {
        Self {
            http,
            address: ip.to_string(),
            base_url: format!("http://{}", SocketAddr::new(ip, port)),
            credentials,
        }
    }

    async fn call(&self, api: &Api, body: Option<String>) -> Result<String> {
        let url = format!("{}{}", self.base_url, api.path);
        debug!("{}: {} {url}", self.address, api.method);

        let mut req = (self.http)
            .request(api.method.clone(), url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password));
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status != StatusCode::OK {
            // the status matters more than a body we can't read
            let body = resp.text().await.unwrap_or_default();
            let msg = body.trim();
            return Err(if msg.is_empty() {
                Error::Status(status)
            } else {
                Error::StatusMessage(status, msg.to_string())
            });
        }

        Ok(resp.text().await?)
    }
}

impl Client for AdminClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn fetch(&self) -> Result<Bundle> {
        let body = self.call(&GET_CONFIG, None).await?;
        Ok(codec::decode(body.as_bytes())?)
    }

    async fn replace(&self, bundle: &Bundle) -> Result<()> {
        let body = codec::encode(bundle)?;
        self.call(&PUT_CONFIG, Some(body)).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.call(&RELOAD, None).await?;
        Ok(())
    }
}
