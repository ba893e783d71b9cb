// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use rand::RngCore;

use crate::proto::NodeId;
use crate::time::{tmin, Time};

use super::neighbour::Neighbour;

/// Per-link tunables. Zero keepalive disables keepalives on the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub trickle_imin: u32,
    pub trickle_imax: u32,
    pub trickle_k: u32,
    pub keepalive_interval: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            trickle_imin: super::TRICKLE_IMIN,
            trickle_imax: super::TRICKLE_IMAX,
            trickle_k: super::TRICKLE_K,
            keepalive_interval: super::KEEPALIVE_INTERVAL,
        }
    }
}

/// An enabled local interface: its Trickle instance, keepalive schedule
/// and the neighbours heard on it.
#[derive(Debug)]
pub struct Link {
    pub(crate) ifname: String,
    /// Locally unique endpoint identifier, never reused in-process.
    pub(crate) ep_id: u32,
    pub(crate) conf: LinkConfig,

    pub(crate) trickle_i: u32,
    pub(crate) trickle_c: u32,
    pub(crate) trickle_send_time: Time,
    pub(crate) trickle_interval_end: Time,
    pub(crate) trickle_sent_in_interval: bool,
    pub(crate) last_trickle_sent: Time,

    pub(crate) next_keepalive: Time,

    /// Preferred source address on this link, if known.
    pub(crate) ipv6_address: Option<Ipv6Addr>,

    pub(crate) neighbours: BTreeMap<(NodeId, u32), Neighbour>,

    pub(crate) num_trickle_sent: u32,
    pub(crate) num_trickle_skipped: u32,
}

impl Link {
    pub(crate) fn new(
        ifname: String,
        ep_id: u32,
        conf: LinkConfig,
        now: Time,
        rng: &mut dyn RngCore,
    ) -> Self {
        let mut link = Link {
            ifname,
            ep_id,
            trickle_i: 0,
            trickle_c: 0,
            trickle_send_time: 0,
            trickle_interval_end: 0,
            trickle_sent_in_interval: false,
            last_trickle_sent: 0,
            next_keepalive: if conf.keepalive_interval > 0 {
                now + Time::from(conf.keepalive_interval)
            } else {
                Time::MAX
            },
            ipv6_address: None,
            neighbours: BTreeMap::new(),
            num_trickle_sent: 0,
            num_trickle_skipped: 0,
            conf,
        };
        let imin = link.conf.trickle_imin;
        link.trickle_set_interval(now, rng, imin);
        link
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    pub fn ep_id(&self) -> u32 {
        self.ep_id
    }

    pub fn num_trickle_sent(&self) -> u32 {
        self.num_trickle_sent
    }

    pub fn num_trickle_skipped(&self) -> u32 {
        self.num_trickle_skipped
    }

    pub fn neighbours(&self) -> impl Iterator<Item = &Neighbour> {
        self.neighbours.values()
    }

    /// Begin a fresh interval of length `i`, with the transmission point
    /// drawn uniformly from its second half.
    pub(crate) fn trickle_set_interval(
        &mut self,
        now: Time,
        rng: &mut dyn RngCore,
        i: u32,
    ) {
        let i = i.clamp(self.conf.trickle_imin, self.conf.trickle_imax);
        self.trickle_i = i;
        self.trickle_c = 0;
        self.trickle_sent_in_interval = false;
        let half = i / 2;
        let jitter = if half > 0 {
            rng.next_u32() % half
        } else {
            0
        };
        self.trickle_send_time = now + Time::from(half + jitter);
        self.trickle_interval_end = now + Time::from(i);
    }

    /// A consistent exchange was observed on the link.
    pub(crate) fn trickle_consistent(&mut self) {
        self.trickle_c += 1;
    }

    /// An inconsistent exchange: fall back to the minimum interval. A
    /// link already at Imin keeps its current interval (RFC 6206 rule).
    pub(crate) fn trickle_inconsistent(
        &mut self,
        now: Time,
        rng: &mut dyn RngCore,
    ) {
        if self.trickle_i != self.conf.trickle_imin {
            let imin = self.conf.trickle_imin;
            self.trickle_set_interval(now, rng, imin);
        }
    }

    /// Earliest instant this link needs attention.
    pub(crate) fn next_deadline(&self) -> Option<Time> {
        let mut deadline = Some(self.trickle_interval_end);
        if !self.trickle_sent_in_interval {
            deadline = tmin(deadline, Some(self.trickle_send_time));
        }
        if self.conf.keepalive_interval > 0 {
            deadline = tmin(deadline, Some(self.next_keepalive));
        }
        deadline
    }
}
