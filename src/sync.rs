//! Replication of the desired proxies onto every member of the fleet.
//!
//! Groupable entries are written to every member, letting the servers
//! load-balance them with their native groups. Other entries are written to
//! exactly one member, picked by hashing the proxy name. Names are qualified
//! with the member's address (`10.0.0.1/ns/route`) once written.

use log::{debug, error, info, log_enabled, warn};
use std::collections::BTreeMap as Map;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::codec::{self, Bundle, Proxies, same_proxies};
use crate::fleet::Members;
use crate::proxy::{Entry, Fields};
use crate::trigger::Trigger;


type Connect<C> = Box<dyn Fn(IpAddr) -> C + Send + Sync>;

pub struct Synchronizer<C> {
    shared: Mutex<Shared<C>>,
    trigger: Trigger,
    connect: Connect<C>,
}

struct Shared<C> {
    /// proxies by owner
    desired: Map<String, Proxies>,
    /// fleet-wide overrides of the members' common section
    common: Fields,
    members: Vec<Arc<C>>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub members: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
}

impl<C: Client> Synchronizer<C> {
    /// `connect` builds the client of a newly seen member.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn(IpAddr) -> C + Send + Sync + 'static,
    {
        Self {
            shared: Mutex::new(Shared {
                desired: Map::new(),
                common: Fields::new(),
                members: Vec::new(),
            }),
            trigger: Trigger::new(),
            connect: Box::new(connect),
        }
    }

    /// Replace the proxies of `owner`.
    ///
    /// Names must be unique within an owner. When two owners use the same
    /// name, the first owner (in key order) wins.
    pub async fn set_proxies(&self, owner: impl Into<String>, proxies: Proxies) {
        let owner = owner.into();

        if log_enabled!(log::Level::Debug) {
            for (name, entry) in &proxies {
                debug!("{owner}: proxy {name}: {entry}");
            }
        }

        let mut shared = self.shared.lock().await;
        shared.desired.insert(owner, proxies);
        self.trigger.notify();
    }

    /// Remove every proxy of `owner`.
    pub async fn delete_proxies(&self, owner: &str) {
        let mut shared = self.shared.lock().await;
        if shared.desired.remove(owner).is_some() {
            debug!("{owner}: proxies deleted");
            self.trigger.notify();
        }
    }

    /// Set the values forced in every member's common section.
    pub async fn set_common(&self, common: Fields) {
        let mut shared = self.shared.lock().await;
        shared.common = common;
        self.trigger.notify();
    }

    /// Request a pass without changing the desired state.
    pub fn trigger_sync(&self) {
        self.trigger.notify();
    }

    /// Rebuild the member list from `addrs`, keeping the clients of known
    /// addresses. The list is sorted and deduplicated first.
    pub async fn update_members(&self, mut addrs: Vec<IpAddr>) {
        addrs.sort();
        addrs.dedup();

        let mut shared = self.shared.lock().await;

        let mut current: Map<String, Arc<C>> = (shared.members.drain(..))
            .map(|member| (member.address().to_string(), member))
            .collect();

        shared.members = addrs
            .into_iter()
            .map(|ip| {
                (current.remove(&ip.to_string()))
                    .unwrap_or_else(|| Arc::new((self.connect)(ip)))
            })
            .collect();

        for addr in current.keys() {
            info!("{addr}: left the fleet");
        }

        self.trigger.notify();
    }

    pub async fn members(&self) -> Vec<Arc<C>> {
        self.shared.lock().await.members.clone()
    }

    /// Run passes on every trigger and every `interval` until cancelled. A
    /// pass in progress when cancelled runs to completion.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut waiter = self.trigger.waiter();
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = waiter.next() => {
                    if res.is_err() {
                        break;
                    }
                },
                _ = ticker.tick() => {},
            }

            let report = self.sync_once().await;
            if report.updated != 0 || report.failed != 0 {
                info!("sync done: {report:?}");
            } else {
                debug!("sync done: {report:?}");
            }

            // the pass just done covers the next tick
            ticker.reset();
        }

        info!("sync stopped");
    }

    /// One reconciliation pass over the current members.
    pub async fn sync_once(&self) -> Report {
        let shared = self.shared.lock().await;

        let split = Split::from_desired(&shared.desired);

        // one snapshot for the whole pass so the partition stays consistent
        let members = shared.members.clone();
        let count = members.len();

        let mut report = Report {
            members: count,
            ..Default::default()
        };

        for (index, member) in members.iter().enumerate() {
            let addr = member.address();

            let live = match member.fetch().await {
                Ok(v) => v,
                Err(e) => {
                    error!("{addr}: get config failed: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            let target = Bundle {
                common: overlay(&live.common, &shared.common),
                proxies: split.target_proxies(addr, index, count),
            };

            if target.common == live.common && same_proxies(&target.proxies, &live.proxies) {
                debug!("{addr}: up to date");
                report.unchanged += 1;
                continue;
            }

            info!("{addr}: updating config ({} proxies)", target.proxies.len());

            if let Err(e) = member.replace(&target).await {
                error!("{addr}: set config failed: {e}");
                report.failed += 1;
                continue;
            }
            if let Err(e) = member.reload().await {
                error!("{addr}: reload failed: {e}");
                report.failed += 1;
                continue;
            }

            report.updated += 1;
        }

        report
    }
}

impl<C: Client> Members for Synchronizer<C> {
    async fn set_members(&self, addrs: Vec<IpAddr>) {
        self.update_members(addrs).await
    }
}

/// Desired proxies of all owners, split by placement.
struct Split<'t> {
    groupable: Map<&'t str, &'t Entry>,
    singletons: Map<&'t str, &'t Entry>,
}

impl<'t> Split<'t> {
    fn from_desired(desired: &'t Map<String, Proxies>) -> Self {
        let mut split = Split {
            groupable: Map::new(),
            singletons: Map::new(),
        };
        let mut owners: Map<&str, &str> = Map::new();

        for (owner, proxies) in desired {
            for (name, entry) in proxies {
                if let Some(first) = owners.get(name.as_str()) {
                    warn!("{owner}: proxy {name} already defined by {first}, ignored");
                    continue;
                }
                if let Err(e) = codec::check_section(name, &entry.fields()) {
                    warn!("{owner}: proxy {name} ignored: {e}");
                    continue;
                }
                owners.insert(name, owner);

                if entry.is_groupable() {
                    split.groupable.insert(name, entry);
                } else {
                    split.singletons.insert(name, entry);
                }
            }
        }

        split
    }

    /// Proxies of the member at `index` among `count`, with qualified names.
    fn target_proxies(&self, addr: &str, index: usize, count: usize) -> Proxies {
        let singletons = (self.singletons.iter()).filter(|(name, _)| placement(name, count) == index);

        (self.groupable.iter())
            .chain(singletons)
            .map(|(name, entry)| (qualified_name(addr, name), (*entry).clone()))
            .collect()
    }
}

/// Name of a proxy once written to the member at `addr`.
pub fn qualified_name(addr: &str, name: &str) -> String {
    format!("{addr}/{name}")
}

/// Polynomial string hash (base 31 over the bytes). Stable across runs.
pub fn name_hash(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32))
}

/// Index of the member holding the singleton `name` in a fleet of `count`.
/// `count` must not be 0.
pub fn placement(name: &str, count: usize) -> usize {
    name_hash(name) as usize % count
}

fn overlay(live: &Fields, overrides: &Fields) -> Fields {
    let mut common = live.clone();
    common.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    common
}
