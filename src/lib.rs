// SPDX-License-Identifier: MIT

//! The `hncp` crate implements the Home Networking Control Protocol: a
//! replicated database of typed records flooded between home routers
//! over link-local UDP multicast, and the prefix/address assignment
//! engine that carves delegated prefixes into per-link assignments on
//! top of it.
//!
//! This crate grouped the protocol into these modules:
//!  * `tlv`: the type-length-value codec every message is built from.
//!  * `proto`: typed wire records (node state, neighbours, prefixes...).
//!  * `core`: the flooding engine (Trickle, node store, reachability).
//!  * `pa`: the prefix and address allocator plus its flooding glue.
//!  * `io`: the UDP socket adapter and the event loop.
//!  * `iface`: the contract with the platform interface manager.
//!
//! The engine itself is sans-io and clock-injected, so everything above
//! `io` runs unmodified inside tests against an in-memory network.

pub mod core;
pub mod iface;
#[cfg(unix)]
pub mod io;
pub mod pa;
pub mod proto;
pub mod tlv;

mod error;
mod hash;
mod ip;
mod time;

#[cfg(test)]
mod tests;

pub use self::error::Error;
pub use self::hash::Digest;
pub use self::ip::Prefix;
pub use self::time::{Clock, SystemClock, Time};

pub use self::core::{Config, Hncp, HNCP_PORT, MULTICAST_GROUP};
pub use self::proto::NodeId;
