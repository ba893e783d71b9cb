// SPDX-License-Identifier: MIT

//! The flooding engine: a replicated database of per-node record
//! containers, reconciled over link-local multicast with Trickle timing.
//!
//! The engine is sans-io. Entry points take the current instant and a
//! [`Transport`] for outbound datagrams; [`Hncp::next_run`] reports when
//! the engine next wants to be driven. One instance per process is the
//! expected deployment, but nothing here is global, so tests freely run
//! several instances against an in-memory transport.

mod flood;
mod link;
mod neighbour;
mod node;
mod subscribe;

pub use self::link::{Link, LinkConfig};
pub use self::neighbour::Neighbour;
pub use self::node::Node;
pub use self::subscribe::{Event, LocalEdits, Subscriber, SubscriberRef};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::{Ipv6Addr, SocketAddrV6};
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info};
use rand::RngCore;

use crate::hash::Digest;
use crate::proto::{
    HncpTlv, KeepaliveIntervalTlv, NeighbourTlv, NodeId, VersionTlv,
    HNCP_T_PEER,
};
use crate::time::{tmin, Time};
use crate::tlv::{canonical_container, tlv_to_bytes, Tlv, TlvBuffer};

use self::node::container_records;

/// Default UDP port.
pub const HNCP_PORT: u16 = 8808;

/// Link-local multicast group the protocol runs on.
pub const MULTICAST_GROUP: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x8808);

/// Upper bound for any single payload.
pub const MAX_PAYLOAD_SIZE: usize = 65536;

/// Upper bound for multicast payloads: IPv6 minimum MTU minus IPv6 and
/// UDP headers.
pub const MAX_MULTICAST_SIZE: usize = 1280 - 40 - 8;

pub(crate) const TRICKLE_IMIN: u32 = 200;
pub(crate) const TRICKLE_IMAX: u32 = 25_600;
pub(crate) const TRICKLE_K: u32 = 1;
pub(crate) const KEEPALIVE_INTERVAL: u32 = 20_000;
const KEEPALIVE_MULTIPLIER_TENTHS: u32 = 21;
const GRACE_INTERVAL: Time = 60_000;

const COLLISIONS_FOR_RENUMBER: usize = 3;
const COLLISION_WINDOW: Time = 60_000;

/// Capability word we publish; peers advertising something else keep
/// flooding but are ignored by the allocator.
pub const CAPABILITIES: u32 = 1;

/// Engine-wide tunables. Per-link Trickle/keepalive settings come from
/// `link_defaults` unless `enable_link_with` overrides them.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub multicast_group: Ipv6Addr,
    pub link_defaults: LinkConfig,
    pub grace_interval: Time,
    pub keepalive_multiplier_tenths: u32,
    pub user_agent: String,
    pub capabilities: u32,
    /// Unit-test escape hatch: never remove unreachable nodes.
    pub disable_prune: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: HNCP_PORT,
            multicast_group: MULTICAST_GROUP,
            link_defaults: LinkConfig::default(),
            grace_interval: GRACE_INTERVAL,
            keepalive_multiplier_tenths: KEEPALIVE_MULTIPLIER_TENTHS,
            user_agent: concat!("hncp/", env!("CARGO_PKG_VERSION")).to_string(),
            capabilities: CAPABILITIES,
            disable_prune: false,
        }
    }
}

/// Outbound datagram sink. The real implementation is the UDP socket
/// adapter; tests wire engines together in memory.
pub trait Transport {
    fn sendto(
        &mut self,
        ifname: &str,
        dst: &SocketAddrV6,
        data: &[u8],
    ) -> std::io::Result<usize>;
}

/// One protocol engine instance.
pub struct Hncp {
    cfg: Config,
    /// Cached instant of the current tick.
    now: Time,
    own_id: NodeId,
    /// Hardware-address material used for identifier renewal and as part
    /// of allocator seeds.
    hw_seed: Vec<u8>,
    rng: Box<dyn RngCore>,

    nodes: BTreeMap<NodeId, Node>,
    /// Locally published records, ordered byte-wise.
    tlvs: BTreeSet<Vec<u8>>,
    links: BTreeMap<String, Link>,
    first_free_ep_id: u32,

    tlvs_dirty: bool,
    links_dirty: bool,
    republish_tlvs: bool,
    graph_dirty: bool,
    last_prune: Time,
    next_prune: Time,
    network_hash_dirty: bool,
    network_hash: Digest,

    /// Update number floor learned from identifier collisions.
    collision_update_base: u32,
    collisions: VecDeque<Time>,

    subscribers: Vec<SubscriberRef>,
}

impl Hncp {
    pub fn new(cfg: Config, own_id: NodeId, rng: Box<dyn RngCore>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(own_id, Node::new(own_id, 0));
        Hncp {
            cfg,
            now: 0,
            own_id,
            hw_seed: Vec::new(),
            rng,
            nodes,
            tlvs: BTreeSet::new(),
            links: BTreeMap::new(),
            first_free_ep_id: 1,
            tlvs_dirty: true,
            links_dirty: false,
            republish_tlvs: false,
            graph_dirty: false,
            last_prune: 0,
            next_prune: 0,
            network_hash_dirty: true,
            network_hash: Digest::default(),
            collision_update_base: 0,
            collisions: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    /// Derive a node identifier from hardware addresses and a salt.
    pub fn derive_node_id(hw_seed: &[u8], salt: &[u8]) -> NodeId {
        let digest = Digest::of_chunks([hw_seed, salt]);
        NodeId(digest.0)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn own_node_id(&self) -> NodeId {
        self.own_id
    }

    pub fn set_hw_seed(&mut self, seed: Vec<u8>) {
        self.hw_seed = seed;
    }

    pub fn hw_seed(&self) -> &[u8] {
        &self.hw_seed
    }

    pub fn network_hash(&self) -> Digest {
        self.network_hash
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn own_node(&self) -> &Node {
        &self.nodes[&self.own_id]
    }

    /// Whether the last prune found this node connected to us.
    pub fn is_reachable(&self, node: &Node) -> bool {
        node.id() == self.own_id
            || node.last_reachable_prune == self.last_prune
    }

    pub fn link(&self, ifname: &str) -> Option<&Link> {
        self.links.get(ifname)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    // ----- endpoint lifecycle -----

    pub fn enable_link(&mut self, ifname: &str) {
        let defaults = self.cfg.link_defaults.clone();
        self.enable_link_with(ifname, defaults)
    }

    pub fn enable_link_with(&mut self, ifname: &str, conf: LinkConfig) {
        if self.links.contains_key(ifname) {
            return;
        }
        let ep_id = self.first_free_ep_id;
        self.first_free_ep_id += 1;
        let link = Link::new(
            ifname.to_string(),
            ep_id,
            conf,
            self.now,
            self.rng.as_mut(),
        );
        info!("endpoint {ifname}[#{ep_id}] enabled");
        self.links.insert(ifname.to_string(), link);
        // Keepalive records may differ per link, so own data changes.
        self.tlvs_dirty = true;
        self.notify(Event::EndpointChanged {
            ifname: ifname.to_string(),
            ep_id,
            enabled: true,
        });
    }

    pub fn disable_link(&mut self, ifname: &str) {
        let Some(link) = self.links.remove(ifname) else {
            return;
        };
        info!("endpoint {ifname}[#{}] disabled", link.ep_id);
        for ((node_id, ep_id), _) in link.neighbours.iter() {
            self.notify(Event::NeighbourRemoved {
                ifname: ifname.to_string(),
                node_id: *node_id,
                ep_id: *ep_id,
            });
        }
        self.links_dirty = true;
        self.schedule_prune();
        self.notify(Event::EndpointChanged {
            ifname: ifname.to_string(),
            ep_id: link.ep_id,
            enabled: false,
        });
    }

    pub fn set_link_ipv6_address(
        &mut self,
        ifname: &str,
        addr: Option<Ipv6Addr>,
    ) {
        if let Some(link) = self.links.get_mut(ifname) {
            link.ipv6_address = addr;
        }
    }

    // ----- local record store -----

    pub fn publish_tlv<T: Tlv>(&mut self, tlv: &T) {
        self.publish_tlv_bytes(tlv_to_bytes(tlv))
    }

    pub fn publish_tlv_bytes(&mut self, tlv: Vec<u8>) {
        if self.tlvs.insert(tlv.clone()) {
            self.tlvs_dirty = true;
            self.notify(Event::LocalTlvAdded { tlv });
        }
    }

    pub fn remove_tlv<T: Tlv>(&mut self, tlv: &T) {
        self.remove_tlv_bytes(&tlv_to_bytes(tlv))
    }

    pub fn remove_tlv_bytes(&mut self, tlv: &[u8]) {
        if self.tlvs.remove(tlv) {
            self.tlvs_dirty = true;
            self.notify(Event::LocalTlvRemoved { tlv: tlv.to_vec() });
        }
    }

    /// Remove every published record of the given kind.
    pub fn remove_tlvs_by_type(&mut self, kind: u16) {
        let victims: Vec<Vec<u8>> = self
            .tlvs
            .iter()
            .filter(|t| t.len() >= 2 && BigEndian::read_u16(&t[..2]) == kind)
            .cloned()
            .collect();
        for tlv in victims {
            self.remove_tlv_bytes(&tlv);
        }
    }

    pub fn local_tlvs(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.tlvs.iter()
    }

    /// Force a republish of own node data on the next run.
    pub fn force_republish(&mut self) {
        self.republish_tlvs = true;
    }

    // ----- subscription -----

    pub fn subscribe(&mut self, sub: SubscriberRef) {
        self.subscribers.push(sub);
    }

    pub fn unsubscribe(&mut self, sub: &SubscriberRef) {
        self.subscribers.retain(|s| !Rc::ptr_eq(s, sub));
    }

    pub(crate) fn notify(&mut self, event: Event) {
        let snapshot = self.subscribers.clone();
        let mut edits = LocalEdits::default();
        for sub in snapshot {
            sub.borrow_mut().notify(&event, &mut edits);
        }
        if !edits.is_empty() {
            self.apply_edits(edits);
        }
    }

    fn apply_edits(&mut self, edits: LocalEdits) {
        for sub in edits.subscribe {
            self.subscribers.push(sub);
        }
        for sub in edits.unsubscribe {
            self.unsubscribe(&sub);
        }
        for kind in edits.remove_by_type {
            self.remove_tlvs_by_type(kind);
        }
        for tlv in edits.remove {
            self.remove_tlv_bytes(&tlv);
        }
        for tlv in edits.publish {
            self.publish_tlv_bytes(tlv);
        }
        if edits.republish {
            self.republish_tlvs = true;
        }
    }

    // ----- own node maintenance -----

    /// Rebuild own node data from the local record store plus the
    /// synthetic records the engine owns (version, keepalive cadence,
    /// neighbour adjacency), bump the update number and re-timestamp.
    fn flush_own_node(&mut self) {
        self.notify(Event::AboutToRepublish);

        let mut records: Vec<Vec<u8>> = self.tlvs.iter().cloned().collect();
        records.push(tlv_to_bytes(&HncpTlv::Version(VersionTlv {
            capabilities: self.cfg.capabilities,
            user_agent: self.cfg.user_agent.clone(),
        })));
        for link in self.links.values() {
            if link.conf.keepalive_interval != KEEPALIVE_INTERVAL {
                records.push(tlv_to_bytes(&HncpTlv::KeepaliveInterval(
                    KeepaliveIntervalTlv {
                        ep_id: link.ep_id,
                        interval_ms: link.conf.keepalive_interval,
                    },
                )));
            }
            for neighbour in link.neighbours.values() {
                records.push(tlv_to_bytes(&HncpTlv::Neighbour(
                    NeighbourTlv {
                        neighbour_node_id: neighbour.node_id,
                        neighbour_ep_id: neighbour.ep_id,
                        local_ep_id: link.ep_id,
                    },
                )));
            }
        }
        let container = canonical_container(records);

        let own = self.nodes.get_mut(&self.own_id).expect("own node");
        if own.update_number() > 0
            && own.data() == container.as_slice()
            && !self.republish_tlvs
        {
            self.tlvs_dirty = false;
            return;
        }
        let old_records = container_records(own.data());
        let update = own.update_number().max(self.collision_update_base) + 1;
        own.set_data(update, self.now, container.clone());
        debug!(
            "republished own node {} update #{update} ({} bytes)",
            self.own_id,
            container.len()
        );
        self.tlvs_dirty = false;
        self.republish_tlvs = false;
        self.network_hash_dirty = true;
        self.schedule_prune();

        let origination = self.now;
        let own_id = self.own_id;
        self.notify_container_diff(
            own_id,
            origination,
            old_records,
            container_records(&container),
        );
    }

    fn notify_container_diff(
        &mut self,
        node: NodeId,
        origination: Time,
        old: Vec<Vec<u8>>,
        new: Vec<Vec<u8>>,
    ) {
        let old: BTreeSet<Vec<u8>> = old.into_iter().collect();
        let new: BTreeSet<Vec<u8>> = new.into_iter().collect();
        for tlv in old.difference(&new) {
            self.notify(Event::TlvRemoved {
                node,
                origination,
                tlv: tlv.clone(),
            });
        }
        for tlv in new.difference(&old) {
            self.notify(Event::TlvAdded {
                node,
                origination,
                tlv: tlv.clone(),
            });
        }
    }

    // ----- node store -----

    /// Insert or refresh a remote node. Content is replaced only when the
    /// update number is strictly newer than what the store holds.
    pub(crate) fn upsert_node(
        &mut self,
        id: NodeId,
        update_number: u32,
        origination_time: Time,
        data: Vec<u8>,
    ) {
        debug_assert_ne!(id, self.own_id);
        if let Some(node) = self.nodes.get_mut(&id) {
            if update_number <= node.update_number() {
                return;
            }
            let old_records = container_records(node.data());
            node.set_data(update_number, origination_time, data.clone());
            debug!("node {id} refreshed, update #{update_number}");
            self.network_hash_dirty = true;
            self.schedule_prune();
            self.notify_container_diff(
                id,
                origination_time,
                old_records,
                container_records(&data),
            );
            return;
        }
        let mut node = Node::new(id, self.now);
        node.set_data(update_number, origination_time, data.clone());
        self.nodes.insert(id, node);
        debug!("node {id} added, update #{update_number}");
        self.network_hash_dirty = true;
        self.schedule_prune();
        self.notify(Event::NodeAdded { id });
        self.notify_container_diff(
            id,
            origination_time,
            Vec::new(),
            container_records(&data),
        );
    }

    fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        info!("node {id} removed");
        let origination = node.origination_time();
        // Change events fire before the node disappears.
        for tlv in container_records(node.data()) {
            self.notify(Event::TlvRemoved {
                node: id,
                origination,
                tlv,
            });
        }
        self.network_hash_dirty = true;
        self.schedule_prune();
        self.notify(Event::NodeRemoved { id });
    }

    // ----- collision handling -----

    /// Record one identifier collision event; returns true when the ring
    /// filled up within the window and we must renumber.
    fn record_collision(&mut self) -> bool {
        self.collisions.push_back(self.now);
        while self.collisions.len() > COLLISIONS_FOR_RENUMBER {
            self.collisions.pop_front();
        }
        self.collisions.len() == COLLISIONS_FOR_RENUMBER
            && self.now - self.collisions[0] <= COLLISION_WINDOW
    }

    pub(crate) fn handle_own_id_conflict(
        &mut self,
        update_number: u32,
        data_hash: Digest,
    ) {
        let own = self.own_node();
        let newer = update_number > own.update_number();
        let equal_diverged = update_number == own.update_number()
            && data_hash != own.data_hash();
        if !newer && !equal_diverged {
            return;
        }
        info!(
            "own identifier {} seen with update #{update_number} (ours #{})",
            self.own_id,
            own.update_number()
        );
        self.collision_update_base =
            self.collision_update_base.max(update_number);
        if self.record_collision() {
            self.renumber();
        } else {
            self.republish_tlvs = true;
        }
    }

    fn renumber(&mut self) {
        let old = self.own_id;
        let mut salt = [0u8; 8];
        self.rng.fill_bytes(&mut salt);
        let new = Self::derive_node_id(&self.hw_seed, &salt);
        if new == old {
            return;
        }
        info!("identifier collision storm: renumbering {old} -> {new}");
        self.remove_node(old);
        self.own_id = new;
        self.nodes.insert(new, Node::new(new, self.now));
        self.collisions.clear();
        self.collision_update_base = 0;
        self.republish_tlvs = true;
        self.network_hash_dirty = true;
        self.schedule_prune();
        self.notify(Event::NodeAdded { id: new });
        self.notify(Event::OwnIdChanged { old, new });
    }

    // ----- reachability -----

    pub(crate) fn schedule_prune(&mut self) {
        self.graph_dirty = true;
        self.next_prune = self.next_prune.min(self.now);
    }

    /// Breadth-first traversal from own node over bidirectionally
    /// published neighbour records; unreachable nodes past the grace
    /// period are dropped.
    fn prune(&mut self) {
        if self.cfg.disable_prune {
            self.graph_dirty = false;
            return;
        }
        let now = self.now;

        // Adjacency snapshot, via each node's type index.
        let mut adjacency: BTreeMap<NodeId, Vec<NeighbourTlv>> =
            BTreeMap::new();
        let node_ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        for id in &node_ids {
            let node = self.nodes.get_mut(id).expect("node");
            let ranges = node.ranges_of_type(HNCP_T_PEER);
            let mut peers = Vec::with_capacity(ranges.len());
            for (start, end) in ranges {
                if let Ok(buf) = TlvBuffer::new_checked(&node.data()[start..end])
                {
                    if let Ok(peer) = NeighbourTlv::parse_value(buf.value()) {
                        peers.push(peer);
                    }
                }
            }
            adjacency.insert(*id, peers);
        }

        let bidirectional = |from: &NodeId, peer: &NeighbourTlv| -> bool {
            adjacency
                .get(&peer.neighbour_node_id)
                .map(|back| {
                    back.iter().any(|b| {
                        b.neighbour_node_id == *from
                            && b.neighbour_ep_id == peer.local_ep_id
                            && b.local_ep_id == peer.neighbour_ep_id
                    })
                })
                .unwrap_or(false)
        };

        let mut reachable = BTreeSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(self.own_id);
        queue.push_back(self.own_id);
        while let Some(id) = queue.pop_front() {
            for peer in adjacency.get(&id).into_iter().flatten() {
                let next = peer.neighbour_node_id;
                if !reachable.contains(&next) && bidirectional(&id, peer) {
                    reachable.insert(next);
                    queue.push_back(next);
                }
            }
        }

        let grace = self.cfg.grace_interval;
        let mut expired = Vec::new();
        let mut earliest_expiry: Option<Time> = None;
        for (id, node) in self.nodes.iter_mut() {
            if reachable.contains(id) {
                node.last_reachable_prune = now;
            } else {
                let expiry = node.last_reachable_prune + grace;
                if expiry <= now {
                    expired.push(*id);
                } else {
                    earliest_expiry = tmin(earliest_expiry, Some(expiry));
                }
            }
        }
        self.last_prune = now;
        self.graph_dirty = false;
        self.next_prune = Time::MAX;
        for id in expired {
            self.remove_node(id);
        }
        if let Some(expiry) = earliest_expiry {
            self.graph_dirty = true;
            self.next_prune = expiry;
        }
        self.network_hash_dirty = true;
    }

    /// Digest over (update number, identifier, data hash) of every
    /// reachable node in identifier order.
    fn recalculate_network_hash(&mut self) {
        let mut material = Vec::new();
        for node in self.nodes.values() {
            if !self.is_reachable(node) {
                continue;
            }
            let mut entry = [0u8; 4];
            BigEndian::write_u32(&mut entry, node.update_number());
            material.extend_from_slice(&entry);
            material.extend_from_slice(node.id().as_bytes());
            material.extend_from_slice(node.data_hash().as_bytes());
        }
        let hash = Digest::of(&material);
        if hash != self.network_hash {
            debug!("network hash is now {hash}");
            self.network_hash = hash;
        }
        self.network_hash_dirty = false;
    }

    // ----- the tick -----

    /// Drive all pending work at instant `now`: republish, prune,
    /// recompute the network hash, run Trickle and keepalive timers and
    /// expire silent neighbours.
    pub fn run(&mut self, now: Time, transport: &mut dyn Transport) {
        self.now = self.now.max(now);
        if self.links_dirty {
            self.links_dirty = false;
            self.tlvs_dirty = true;
        }
        if self.tlvs_dirty || self.republish_tlvs {
            self.flush_own_node();
            // Subscribers may have queued more edits.
            if self.links_dirty {
                self.links_dirty = false;
                self.tlvs_dirty = true;
            }
            if self.tlvs_dirty || self.republish_tlvs {
                self.flush_own_node();
            }
        }
        if self.graph_dirty && self.now >= self.next_prune {
            self.prune();
        }
        if self.network_hash_dirty {
            self.recalculate_network_hash();
        }
        self.expire_neighbours();
        if self.links_dirty {
            self.links_dirty = false;
            self.tlvs_dirty = true;
            self.flush_own_node();
            if self.network_hash_dirty {
                self.recalculate_network_hash();
            }
        }
        self.run_link_timers(transport);
    }

    fn expire_neighbours(&mut self) {
        let now = self.now;
        let multiplier = self.cfg.keepalive_multiplier_tenths;
        let mut removed = Vec::new();
        for link in self.links.values_mut() {
            let ifname = link.ifname.clone();
            link.neighbours.retain(|(node_id, ep_id), neighbour| {
                if neighbour.keepalive_interval == 0 {
                    return true;
                }
                let keep = neighbour.expiry(multiplier) > now;
                if !keep {
                    removed.push((ifname.clone(), *node_id, *ep_id));
                }
                keep
            });
        }
        for (ifname, node_id, ep_id) in removed {
            info!("neighbour {node_id}/#{ep_id} on {ifname} timed out");
            self.links_dirty = true;
            self.schedule_prune();
            self.notify(Event::NeighbourRemoved {
                ifname,
                node_id,
                ep_id,
            });
        }
    }

    fn run_link_timers(&mut self, transport: &mut dyn Transport) {
        let now = self.now;
        let names: Vec<String> = self.links.keys().cloned().collect();
        for name in names {
            let mut send_multicast = false;
            {
                let link = self.links.get_mut(&name).expect("link");
                if now >= link.trickle_interval_end {
                    let next = link.trickle_i.saturating_mul(2);
                    link.trickle_set_interval(now, self.rng.as_mut(), next);
                }
                if !link.trickle_sent_in_interval
                    && now >= link.trickle_send_time
                {
                    link.trickle_sent_in_interval = true;
                    if link.trickle_c < link.conf.trickle_k {
                        send_multicast = true;
                        link.num_trickle_sent += 1;
                        link.last_trickle_sent = now;
                    } else {
                        link.num_trickle_skipped += 1;
                    }
                }
                if link.conf.keepalive_interval > 0
                    && now >= link.next_keepalive
                {
                    send_multicast = true;
                }
                if send_multicast && link.conf.keepalive_interval > 0 {
                    link.next_keepalive =
                        now + Time::from(link.conf.keepalive_interval);
                }
            }
            if send_multicast {
                self.send_network_state(transport, &name, None);
            }
        }
    }

    /// Earliest instant `run` should be called again.
    pub fn next_run(&self) -> Option<Time> {
        if self.tlvs_dirty
            || self.links_dirty
            || self.republish_tlvs
            || self.network_hash_dirty
        {
            return Some(self.now);
        }
        let mut deadline = None;
        if self.graph_dirty {
            deadline = tmin(deadline, Some(self.next_prune));
        }
        for link in self.links.values() {
            deadline = tmin(deadline, link.next_deadline());
            let multiplier = self.cfg.keepalive_multiplier_tenths;
            for neighbour in link.neighbours.values() {
                if neighbour.keepalive_interval > 0 {
                    deadline =
                        tmin(deadline, Some(neighbour.expiry(multiplier)));
                }
            }
        }
        deadline
    }
}
