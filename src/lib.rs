//! Keep a fleet of proxy servers configured with a desired set of proxies.
//!
//! The fleet is found by resolving a DNS name ([`fleet`]), each member is
//! driven through its admin API ([`client`]) using the [`codec`] text
//! format, and the [`sync::Synchronizer`] reconciles every member with the
//! desired [`proxy`] entries.

pub mod client;
pub mod codec;
pub mod fleet;
pub mod proxy;
pub mod sync;
pub mod trigger;
