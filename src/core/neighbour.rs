// SPDX-License-Identifier: MIT

use std::net::SocketAddrV6;

use crate::proto::NodeId;
use crate::time::Time;

/// A remote endpoint heard on one of our links.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub node_id: NodeId,
    /// The peer's endpoint identifier on its side of the link.
    pub ep_id: u32,
    /// Where the peer last spoke from.
    pub last_addr: SocketAddrV6,
    /// Last time a consistent network-state exchange completed.
    pub last_sync: Time,
    /// Cadence the peer has advertised (refreshed from its node data).
    pub keepalive_interval: u32,
}

impl Neighbour {
    pub(crate) fn new(
        node_id: NodeId,
        ep_id: u32,
        addr: SocketAddrV6,
        now: Time,
        keepalive_interval: u32,
    ) -> Self {
        Neighbour {
            node_id,
            ep_id,
            last_addr: addr,
            last_sync: now,
            keepalive_interval,
        }
    }

    /// Deadline after which this neighbour is considered gone. The factor
    /// is 2.1 in units of a tenth.
    pub(crate) fn expiry(&self, multiplier_tenths: u32) -> Time {
        self.last_sync
            + Time::from(self.keepalive_interval) * Time::from(multiplier_tenths) / 10
    }
}
