// SPDX-License-Identifier: MIT

// End-to-end scenarios: several engine instances wired together over an
// in-memory network, driven by a manual clock. Wire-format details have
// their own tests next to the codec; these exercise convergence,
// collision handling, pruning and the allocator.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::{Config, Hncp, Transport, HNCP_PORT};
use crate::ip::Prefix;
use crate::pa::store::PaStore;
use crate::pa::{HncpPaHandle, UlaConf};
use crate::proto::{parse_tlvs, AssignedPrefixTlv, HncpTlv, NodeId};
use crate::time::{tmin, Time};

type Queue = Rc<RefCell<Vec<(usize, String, SocketAddrV6, Vec<u8>)>>>;

struct Outbox {
    node: usize,
    queue: Queue,
}

impl Transport for Outbox {
    fn sendto(
        &mut self,
        ifname: &str,
        dst: &SocketAddrV6,
        data: &[u8],
    ) -> std::io::Result<usize> {
        self.queue.borrow_mut().push((
            self.node,
            ifname.to_string(),
            *dst,
            data.to_vec(),
        ));
        Ok(data.len())
    }
}

struct SimNode {
    hncp: Hncp,
    pa: HncpPaHandle,
    outbox: Outbox,
}

struct Sim {
    now: Time,
    queue: Queue,
    nodes: Vec<SimNode>,
    /// (node, interface) -> segment.
    topology: BTreeMap<(usize, String), u32>,
}

fn node_id(tail: u8) -> NodeId {
    NodeId([0, 0, 0, 0, 0, 0, 0, tail])
}

fn link_local(node: usize) -> Ipv6Addr {
    Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, node as u16 + 1)
}

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn quiet_ula_conf() -> UlaConf {
    UlaConf {
        use_ula: false,
        use_ipv4: false,
        ..UlaConf::default()
    }
}

impl Sim {
    fn new() -> Self {
        Sim {
            now: 0,
            queue: Rc::new(RefCell::new(Vec::new())),
            nodes: Vec::new(),
            topology: BTreeMap::new(),
        }
    }

    fn add_node_full(
        &mut self,
        cfg: Config,
        id: NodeId,
        ula: UlaConf,
        store: PaStore,
    ) -> usize {
        let ix = self.nodes.len();
        let mut hncp = Hncp::new(
            cfg,
            id,
            Box::new(StdRng::seed_from_u64(1000 + ix as u64)),
        );
        // Distinct fake hardware addresses per node.
        hncp.set_hw_seed(vec![ix as u8 + 1; 12]);
        let pa = HncpPaHandle::new(
            &mut hncp,
            ula,
            store,
            Box::new(StdRng::seed_from_u64(2000 + ix as u64)),
        );
        self.nodes.push(SimNode {
            hncp,
            pa,
            outbox: Outbox {
                node: ix,
                queue: self.queue.clone(),
            },
        });
        ix
    }

    fn add_node(&mut self, tail: u8) -> usize {
        self.add_node_full(
            Config::default(),
            node_id(tail),
            quiet_ula_conf(),
            PaStore::ephemeral(),
        )
    }

    fn attach(&mut self, node: usize, ifname: &str, segment: u32) {
        self.topology
            .insert((node, ifname.to_string()), segment);
        let n = &mut self.nodes[node];
        n.pa.set_internal(&mut n.hncp, ifname, true);
        self.pump();
    }

    fn detach(&mut self, node: usize, ifname: &str) {
        self.topology.remove(&(node, ifname.to_string()));
        let n = &mut self.nodes[node];
        n.pa.set_internal(&mut n.hncp, ifname, false);
        self.pump();
    }

    fn give_uplink(
        &mut self,
        node: usize,
        ifname: &str,
        prefix: &str,
        excluded: Option<&str>,
    ) {
        let prefix = p(prefix);
        let excluded = excluded.map(p);
        let n = &mut self.nodes[node];
        n.pa.update_delegated_prefix(
            ifname,
            &prefix,
            excluded.as_ref(),
            self.now + 1_000_000_000,
            self.now + 500_000_000,
            &[],
        );
        self.pump();
    }

    fn deliver(&mut self) {
        for _ in 0..10_000 {
            let batch: Vec<_> =
                self.queue.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            for (from, ifname, dst, data) in batch {
                let Some(segment) = self
                    .topology
                    .get(&(from, ifname.clone()))
                    .copied()
                else {
                    continue;
                };
                let multicast = dst.ip().is_multicast();
                let src =
                    SocketAddrV6::new(link_local(from), HNCP_PORT, 0, 0);
                let targets: Vec<(usize, String)> = self
                    .topology
                    .iter()
                    .filter(|((n, _), s)| **s == segment && *n != from)
                    .map(|((n, i), _)| (*n, i.clone()))
                    .collect();
                for (to, rifname) in targets {
                    if !multicast && *dst.ip() != link_local(to) {
                        continue;
                    }
                    let SimNode { hncp, pa, outbox } = &mut self.nodes[to];
                    hncp.handle_datagram(
                        self.now,
                        outbox,
                        &rifname,
                        src,
                        *dst.ip(),
                        &data,
                    );
                    pa.run(self.now, hncp);
                }
            }
        }
        panic!("network did not quiesce");
    }

    /// Run everything runnable at the current instant, delivering all
    /// traffic it generates.
    fn pump(&mut self) {
        for _ in 0..64 {
            for ix in 0..self.nodes.len() {
                let SimNode { hncp, pa, outbox } = &mut self.nodes[ix];
                hncp.run(self.now, outbox);
                pa.run(self.now, hncp);
            }
            self.deliver();
            let busy = self.nodes.iter().any(|n| {
                matches!(n.hncp.next_run(), Some(t) if t <= self.now)
                    || matches!(n.pa.next_run(), Some(t) if t <= self.now)
            });
            if !busy && self.queue.borrow().is_empty() {
                return;
            }
        }
    }

    /// Advance virtual time to `until`, waking nodes at each deadline.
    fn settle(&mut self, until: Time) {
        self.pump();
        while self.now < until {
            let mut next: Option<Time> = None;
            for n in &self.nodes {
                next = tmin(next, n.hncp.next_run());
                next = tmin(next, n.pa.next_run());
            }
            self.now = match next {
                // A deadline the pump failed to clear: nudge forward.
                Some(t) if t <= self.now => (self.now + 1).min(until),
                Some(t) => t.min(until),
                None => until,
            };
            self.pump();
        }
    }

    fn hash(&self, node: usize) -> crate::Digest {
        self.nodes[node].hncp.network_hash()
    }

    /// Every assigned-prefix record in `viewer`'s replicated database.
    fn flooded_aps(&self, viewer: usize) -> Vec<(NodeId, AssignedPrefixTlv)> {
        let mut out = Vec::new();
        for node in self.nodes[viewer].hncp.nodes() {
            let Ok(tlvs) = parse_tlvs(node.data()) else {
                continue;
            };
            for tlv in tlvs {
                if let HncpTlv::AssignedPrefix(ap) = tlv {
                    out.push((node.id(), ap));
                }
            }
        }
        out
    }

    /// Published assignments of a node's own prefix core.
    fn published(&self, node: usize) -> Vec<(String, Prefix, u8)> {
        self.nodes[node].pa.with_state(|pa, _| {
            pa.assignments()
                .filter(|l| l.published)
                .map(|l| {
                    (
                        pa.link_name(l.link).unwrap_or("?").to_string(),
                        l.assigned.expect("published implies assigned"),
                        l.priority,
                    )
                })
                .collect()
        })
    }

    fn applied(&self, node: usize) -> Vec<(String, Prefix)> {
        self.nodes[node].pa.with_state(|pa, _| {
            pa.assignments()
                .filter(|l| l.applied)
                .map(|l| {
                    (
                        pa.link_name(l.link).unwrap_or("?").to_string(),
                        l.assigned.expect("applied implies assigned"),
                    )
                })
                .collect()
        })
    }
}

#[test]
fn two_node_handshake() {
    let mut sim = Sim::new();
    let n1 = sim.add_node(1);
    let n2 = sim.add_node(2);
    sim.attach(n1, "lan0", 0);
    sim.attach(n2, "lan0", 0);

    sim.settle(5_000);
    assert_eq!(sim.hash(n1), sim.hash(n2));
    assert_eq!(sim.nodes[n1].hncp.nodes().count(), 2);
    assert_eq!(sim.nodes[n2].hncp.nodes().count(), 2);

    // With k=1 and a quiet, consistent network the redundancy counter
    // suppresses most scheduled transmissions.
    sim.settle(120_000);
    assert_eq!(sim.hash(n1), sim.hash(n2));
    let skipped = sim.nodes[n1]
        .hncp
        .link("lan0")
        .expect("link")
        .num_trickle_skipped();
    assert!(skipped >= 1, "no trickle transmission was suppressed");
}

#[test]
fn update_numbers_are_monotonic() {
    let mut sim = Sim::new();
    let n1 = sim.add_node(1);
    let n2 = sim.add_node(2);
    sim.attach(n1, "lan0", 0);
    sim.attach(n2, "lan0", 0);
    sim.settle(5_000);

    let id1 = sim.nodes[n1].hncp.own_node_id();
    let mut last = 0;
    for step in 1..=5i64 {
        sim.settle(5_000 + step * 10_000);
        let seen = sim.nodes[n2]
            .hncp
            .find_node(&id1)
            .expect("n1 known to n2")
            .update_number();
        assert!(seen >= last, "update number went backwards");
        last = seen;
    }
    assert!(last >= 1);
}

#[test]
fn delegated_prefix_is_flooded_and_assigned() {
    let mut sim = Sim::new();
    let n1 = sim.add_node(1);
    let n2 = sim.add_node(2);
    sim.attach(n1, "lan0", 0);
    sim.attach(n2, "lan0", 0);
    sim.settle(3_000);
    sim.give_uplink(n1, "wan0", "2001:db8::/56", None);
    sim.settle(20_000);

    let dp = p("2001:db8::/56");
    // Somebody published a /64 for the shared link into the flood.
    let aps = sim.flooded_aps(n2);
    assert!(
        aps.iter().any(|(_, ap)| {
            ap.prefix.plen() == 64 && dp.contains(&ap.prefix)
        }),
        "no assigned /64 within the delegation: {aps:?}"
    );
    // Both routers converged on the same prefix for the shared link.
    let a1 = sim.applied(n1);
    let a2 = sim.applied(n2);
    let lan1 = a1.iter().find(|(l, _)| l == "lan0").map(|(_, p)| *p);
    let lan2 = a2.iter().find(|(l, _)| l == "lan0").map(|(_, p)| *p);
    assert_eq!(lan1, lan2);
    assert!(lan1.is_some_and(|pfx| dp.contains(&pfx)));
    // And exactly one of them is the publisher.
    let p1 = sim.published(n1);
    let p2 = sim.published(n2);
    let publishers = p1
        .iter()
        .chain(p2.iter())
        .filter(|(l, _, _)| l == "lan0")
        .count();
    assert_eq!(publishers, 1);
}

#[test]
fn assignments_never_overlap_at_equal_priority() {
    let mut sim = Sim::new();
    let nodes: Vec<usize> = (1..=3u8).map(|i| sim.add_node(i)).collect();
    for (ix, n) in nodes.iter().enumerate() {
        sim.attach(*n, "lan0", 0);
        sim.attach(*n, "lan1", 10 + ix as u32);
    }
    sim.settle(3_000);
    sim.give_uplink(nodes[0], "wan0", "2001:db8::/56", None);
    sim.settle(40_000);

    for n in &nodes {
        assert_eq!(sim.hash(nodes[0]), sim.hash(*n));
    }
    let aps = sim.flooded_aps(nodes[0]);
    // Four distinct links want prefixes: the shared one and three
    // private ones.
    let mut prefixes: Vec<Prefix> =
        aps.iter().map(|(_, ap)| ap.prefix).collect();
    prefixes.sort();
    prefixes.dedup();
    assert_eq!(prefixes.len(), 4, "unexpected assignments: {aps:?}");
    for (i, a) in aps.iter().enumerate() {
        for b in &aps[i + 1..] {
            if a.1.prefix != b.1.prefix && a.1.priority == b.1.priority {
                assert!(
                    !a.1.prefix.overlaps(&b.1.prefix),
                    "{:?} overlaps {:?}",
                    a,
                    b
                );
            }
        }
    }
}

#[test]
fn identifier_collision_causes_rename() {
    let mut sim = Sim::new();
    let mut cfg1 = Config::default();
    cfg1.user_agent = "hncp/test-a".to_string();
    let mut cfg2 = Config::default();
    cfg2.user_agent = "hncp/test-b".to_string();
    // Same identifier, different node data.
    let n1 = sim.add_node_full(
        cfg1,
        node_id(1),
        quiet_ula_conf(),
        PaStore::ephemeral(),
    );
    let n2 = sim.add_node_full(
        cfg2,
        node_id(1),
        quiet_ula_conf(),
        PaStore::ephemeral(),
    );
    sim.attach(n1, "lan0", 0);
    sim.attach(n2, "lan0", 0);

    sim.settle(60_000);
    let id1 = sim.nodes[n1].hncp.own_node_id();
    let id2 = sim.nodes[n2].hncp.own_node_id();
    assert_ne!(id1, id2, "collision was never resolved");
    assert_eq!(sim.hash(n1), sim.hash(n2));
    assert_eq!(sim.nodes[n1].hncp.nodes().count(), 2);
    assert_eq!(sim.nodes[n2].hncp.nodes().count(), 2);
}

#[test]
fn ula_generation_and_reuse_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pa.state");

    let first = {
        let mut sim = Sim::new();
        let n = sim.add_node_full(
            Config::default(),
            node_id(1),
            UlaConf {
                use_ipv4: false,
                ..UlaConf::default()
            },
            PaStore::open(path.clone()),
        );
        sim.attach(n, "lan0", 0);
        // Backoff is at most 3010 ms.
        sim.settle(20_000);
        let ulas: Vec<Prefix> = sim.nodes[n].pa.with_state(|pa, _| {
            pa.assignments()
                .filter_map(|l| l.assigned)
                .filter(|p| p.is_ula())
                .collect()
        });
        assert!(!ulas.is_empty(), "no ULA assignment appeared");
        let ula48: Vec<Prefix> = sim
            .flooded_aps(n)
            .iter()
            .map(|(_, ap)| ap.prefix)
            .filter(|p| p.is_ula() && p.plen() == 64)
            .collect();
        assert!(!ula48.is_empty(), "ULA assignment was not flooded");
        sim.nodes[n].pa.flush_storage();
        ula48[0]
    };

    // A restarted router must come back with the same /48.
    let mut sim = Sim::new();
    let n = sim.add_node_full(
        Config::default(),
        node_id(1),
        UlaConf {
            use_ipv4: false,
            ..UlaConf::default()
        },
        PaStore::open(path),
    );
    sim.attach(n, "lan0", 0);
    sim.settle(20_000);
    let again: Vec<Prefix> = sim
        .flooded_aps(n)
        .iter()
        .map(|(_, ap)| ap.prefix)
        .filter(|p| p.is_ula() && p.plen() == 64)
        .collect();
    assert!(!again.is_empty());
    let ula_of = |pfx: &Prefix| Prefix::new(pfx.addr(), 48);
    assert_eq!(ula_of(&first), ula_of(&again[0]));
}

#[test]
fn partitions_heal_without_renumbering() {
    let mut sim = Sim::new();
    let nodes: Vec<usize> = (1..=4u8).map(|i| sim.add_node(i)).collect();
    sim.attach(nodes[0], "lan0", 0);
    sim.attach(nodes[1], "lan0", 0);
    sim.attach(nodes[2], "lan0", 1);
    sim.attach(nodes[3], "lan0", 1);
    sim.give_uplink(nodes[0], "wan0", "2001:db8::/56", None);
    sim.settle(30_000);

    assert_eq!(sim.hash(nodes[0]), sim.hash(nodes[1]));
    assert_eq!(sim.hash(nodes[2]), sim.hash(nodes[3]));
    assert_ne!(sim.hash(nodes[0]), sim.hash(nodes[2]));
    // Whoever won the shared-link election holds the assignment.
    let before: Vec<(usize, (String, Prefix, u8))> = [nodes[0], nodes[1]]
        .iter()
        .flat_map(|n| {
            sim.published(*n).into_iter().map(move |entry| (*n, entry))
        })
        .collect();
    assert!(!before.is_empty());

    // Bridge the partitions.
    sim.attach(nodes[1], "bridge", 7);
    sim.attach(nodes[2], "bridge", 7);
    let deadline = sim.now + 120_000;
    sim.settle(deadline);

    for n in &nodes {
        assert_eq!(sim.hash(nodes[0]), sim.hash(*n));
        assert_eq!(sim.nodes[*n].hncp.nodes().count(), 4);
    }
    // Prior assignments survived the heal.
    for (owner, entry) in &before {
        assert!(
            sim.published(*owner).contains(entry),
            "assignment {entry:?} was renumbered"
        );
    }
}

#[test]
fn excluded_prefix_is_never_assigned() {
    let mut sim = Sim::new();
    let n1 = sim.add_node(1);
    let n2 = sim.add_node(2);
    sim.attach(n1, "lan0", 0);
    sim.attach(n2, "lan0", 0);
    sim.attach(n2, "lan1", 1);
    sim.settle(3_000);
    sim.give_uplink(
        n1,
        "wan0",
        "2001:db8::/56",
        Some("2001:db8:0:0::/64"),
    );
    sim.settle(40_000);

    let excluded = p("2001:db8:0:0::/64");
    for viewer in [n1, n2] {
        for (node, ap) in sim.flooded_aps(viewer) {
            if ap.priority < 15 {
                assert!(
                    !ap.prefix.overlaps(&excluded),
                    "{node} assigned {} inside the excluded range",
                    ap.prefix
                );
            }
        }
    }
    // Assignments still happened, just elsewhere in the delegation.
    assert!(!sim.applied(n2).is_empty());
}

#[test]
fn crashed_publisher_prefix_is_adopted() {
    let mut sim = Sim::new();
    // Higher identifier wins prefix election, so give it to the node
    // that will crash.
    let survivor = sim.add_node(1);
    let casualty = sim.add_node(9);
    sim.attach(survivor, "lan0", 0);
    sim.attach(casualty, "lan0", 0);
    sim.settle(3_000);
    // The delegation outlives the crash: it comes from the survivor.
    sim.give_uplink(survivor, "wan0", "2001:db8::/56", None);
    sim.settle(30_000);

    let published_by_casualty = sim.published(casualty);
    let lan_prefix = published_by_casualty
        .iter()
        .find(|(l, _, _)| l == "lan0")
        .map(|(_, p, _)| *p)
        .expect("higher id should have won the shared link");
    assert!(sim
        .published(survivor)
        .iter()
        .all(|(l, _, _)| l != "lan0"));

    // Crash: the node leaves the link and never speaks again.
    sim.detach(casualty, "lan0");
    let deadline = sim.now + 150_000;
    sim.settle(deadline);

    // The survivor adopted the very same prefix rather than generating
    // a fresh one.
    let adopted = sim
        .published(survivor)
        .iter()
        .find(|(l, _, _)| l == "lan0")
        .map(|(_, p, _)| *p);
    assert_eq!(adopted, Some(lan_prefix));
}

#[test]
fn one_way_neighbour_claims_do_not_create_reachability() {
    use crate::proto::{emit_message, NeighbourTlv, NodeEndpointTlv};

    let queue: Queue = Rc::new(RefCell::new(Vec::new()));
    let mut outbox = Outbox {
        node: 0,
        queue: queue.clone(),
    };
    let mut hncp = Hncp::new(
        Config::default(),
        node_id(1),
        Box::new(StdRng::seed_from_u64(7)),
    );
    hncp.enable_link("lan0");
    hncp.run(0, &mut outbox);

    let peer = node_id(2);
    // The peer introduces itself, which makes us publish a neighbour
    // record for it.
    let hello = emit_message(&[HncpTlv::NodeEndpoint(NodeEndpointTlv {
        node_id: peer,
        ep_id: 5,
    })]);
    let src = SocketAddrV6::new(link_local(9), HNCP_PORT, 0, 0);
    hncp.handle_datagram(10, &mut outbox, "lan0", src, link_local(0), &hello);
    hncp.run(10, &mut outbox);

    // The peer's node data claims a *mismatching* endpoint pair.
    let own_id = hncp.own_node_id();
    let bogus = emit_message(&[HncpTlv::Neighbour(NeighbourTlv {
        neighbour_node_id: own_id,
        neighbour_ep_id: 99,
        local_ep_id: 5,
    })]);
    hncp.upsert_node(peer, 1, 10, bogus);
    hncp.run(20, &mut outbox);
    let node = hncp.find_node(&peer).expect("peer in store");
    assert!(!hncp.is_reachable(node), "one-way claim became reachable");

    // With the mirror-image record the edge is bidirectional.
    let ep = hncp.link("lan0").expect("link").ep_id();
    let good = emit_message(&[HncpTlv::Neighbour(NeighbourTlv {
        neighbour_node_id: own_id,
        neighbour_ep_id: ep,
        local_ep_id: 5,
    })]);
    hncp.upsert_node(peer, 2, 30, good);
    hncp.run(40, &mut outbox);
    let node = hncp.find_node(&peer).expect("peer in store");
    assert!(hncp.is_reachable(node), "bidirectional edge not detected");
}

#[test]
fn republish_increments_update_number() {
    let queue: Queue = Rc::new(RefCell::new(Vec::new()));
    let mut outbox = Outbox {
        node: 0,
        queue,
    };
    let mut hncp = Hncp::new(
        Config::default(),
        node_id(1),
        Box::new(StdRng::seed_from_u64(7)),
    );
    hncp.run(0, &mut outbox);
    let first = hncp.own_node().update_number();
    assert!(first >= 1);

    hncp.publish_tlv(&HncpTlv::Dhcpv6Data(vec![1, 2, 3]));
    hncp.run(1, &mut outbox);
    let second = hncp.own_node().update_number();
    assert!(second > first);

    // No change, no republish.
    hncp.run(2, &mut outbox);
    assert_eq!(hncp.own_node().update_number(), second);
}
