use itertools::Itertools;
use log::{error, info, warn};
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Name resolution of the fleet's host name.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;
}

/// Resolve using the system resolver.
pub struct DnsResolver;

impl Resolve for DnsResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Receiver of fleet membership changes.
pub trait Members: Send + Sync {
    /// The fleet is now exactly `addrs` (sorted, no duplicates).
    fn set_members(&self, addrs: Vec<IpAddr>) -> impl Future<Output = ()> + Send;
}

/// Tracks the addresses a host name resolves to.
pub struct DomainWatcher<R> {
    host: String,
    resolver: R,
    addrs: Vec<IpAddr>,
}

impl<R: Resolve> DomainWatcher<R> {
    pub fn new(host: impl Into<String>, resolver: R) -> Self {
        Self {
            host: host.into(),
            resolver,
            addrs: Vec::new(),
        }
    }

    /// Last addresses reported.
    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    /// Resolve now, then on every `interval`, reporting changes to `members`
    /// until cancelled.
    pub async fn watch<M: Members>(
        mut self,
        members: Arc<M>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        info!("{}: watching fleet members", self.host);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }

            if let Some(addrs) = self.refresh().await {
                members.set_members(addrs).await;
            }
        }

        info!("{}: fleet watch stopped", self.host);
    }

    /// Resolve the host once, returning the new address list if it changed.
    /// Failures keep the previous list.
    pub async fn refresh(&mut self) -> Option<Vec<IpAddr>> {
        let mut addrs = match self.resolver.resolve(&self.host).await {
            Ok(v) => v,
            Err(e) => {
                error!("{}: lookup failed: {e}", self.host);
                return None;
            }
        };

        if addrs.is_empty() {
            warn!("{}: lookup returned no address, keeping current members", self.host);
            return None;
        }

        addrs.sort();
        addrs.dedup();

        if addrs == self.addrs {
            return None;
        }

        info!("{}: members: [{}]", self.host, addrs.iter().join(", "));
        self.addrs = addrs.clone();
        Some(addrs)
    }
}
