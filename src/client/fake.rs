//! In-memory fleet member for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};

use super::{Client, Error, Result};
use crate::codec::{self, Bundle};
use http::StatusCode;

pub struct FakeClient {
    address: String,
    /// live configuration, in wire format
    config: Mutex<String>,
    fetches: AtomicUsize,
    replaces: AtomicUsize,
    reloads: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_reload: AtomicBool,
}

impl FakeClient {
    /// A member at `address` whose live configuration starts as `fixture`.
    pub fn new(address: impl Into<String>, fixture: Bundle) -> Self {
        Self {
            address: address.into(),
            config: Mutex::new(codec::encode(&fixture).unwrap()),
            fetches: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            fail_reload: AtomicBool::new(false),
        }
    }

    /// Live configuration, as the member would report it.
    pub fn config(&self) -> Bundle {
        let config = self.config.lock().unwrap();
        codec::decode(config.as_bytes()).unwrap()
    }

    pub fn proxy_names(&self) -> Vec<String> {
        self.config().proxies.into_keys().collect()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(SeqCst)
    }
    pub fn replaces(&self) -> usize {
        self.replaces.load(SeqCst)
    }
    pub fn reloads(&self) -> usize {
        self.reloads.load(SeqCst)
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, SeqCst);
    }
    pub fn set_fail_reload(&self, fail: bool) {
        self.fail_reload.store(fail, SeqCst);
    }
}

impl Client for FakeClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn fetch(&self) -> Result<Bundle> {
        self.fetches.fetch_add(1, SeqCst);
        if self.fail_fetch.load(SeqCst) {
            return Err(Error::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(self.config())
    }

    async fn replace(&self, bundle: &Bundle) -> Result<()> {
        self.replaces.fetch_add(1, SeqCst);
        let config = codec::encode(bundle)?;
        *self.config.lock().unwrap() = config;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, SeqCst);
        if self.fail_reload.load(SeqCst) {
            return Err(Error::StatusMessage(
                StatusCode::INTERNAL_SERVER_ERROR,
                "reload failed".into(),
            ));
        }
        Ok(())
    }
}
