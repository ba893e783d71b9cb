// SPDX-License-Identifier: MIT

//! Datagram handling and message construction.

use std::net::{Ipv6Addr, SocketAddrV6};

use log::{debug, warn};

use crate::hash::Digest;
use crate::proto::{
    emit_message, parse_tlvs, HncpTlv, NodeEndpointTlv, NodeId, NodeStateTlv,
};
use crate::time::{local_abs_to_remote_rel, Time};
use crate::tlv::{tlvs_buffer_len, Tlv};

use super::{Event, Hncp, Transport, KEEPALIVE_INTERVAL, MAX_MULTICAST_SIZE, MAX_PAYLOAD_SIZE};

fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

impl Hncp {
    /// Process one received datagram. Malformed input drops the whole
    /// datagram; nothing is partially applied.
    pub fn handle_datagram(
        &mut self,
        now: Time,
        transport: &mut dyn Transport,
        ifname: &str,
        src: SocketAddrV6,
        dst: Ipv6Addr,
        data: &[u8],
    ) {
        self.now = self.now.max(now);
        if data.len() > MAX_PAYLOAD_SIZE {
            return;
        }
        if !self.links.contains_key(ifname) {
            debug!("datagram on disabled interface {ifname}");
            return;
        }
        if !is_link_local(src.ip()) {
            debug!("dropping non-link-local datagram from {src}");
            return;
        }
        if dst.is_multicast() && dst != self.cfg.multicast_group {
            return;
        }
        let tlvs = match parse_tlvs(data) {
            Ok(tlvs) => tlvs,
            Err(e) => {
                debug!("dropping malformed datagram from {src}: {e}");
                return;
            }
        };

        let sender = tlvs.iter().find_map(|tlv| match tlv {
            HncpTlv::NodeEndpoint(ep) => Some(*ep),
            _ => None,
        });
        if let Some(sender) = sender {
            // A datagram tagged with our own identifier is either an echo
            // or an identifier collision; never a neighbour.
            if sender.node_id != self.own_id {
                self.neighbour_heard(ifname, sender, src);
            }
        }

        for tlv in &tlvs {
            match tlv {
                HncpTlv::RequestNetworkState => {
                    self.send_network_state(transport, ifname, Some(src));
                }
                HncpTlv::RequestNodeState(id) => {
                    self.send_node_state(transport, ifname, src, *id, true);
                }
                HncpTlv::NetworkState(hash) => {
                    self.handle_network_state(
                        transport, ifname, src, sender, *hash,
                    );
                }
                HncpTlv::NodeState(state) => {
                    self.handle_node_state(transport, ifname, src, state);
                }
                _ => {}
            }
        }
    }

    fn neighbour_heard(
        &mut self,
        ifname: &str,
        sender: NodeEndpointTlv,
        src: SocketAddrV6,
    ) {
        let keepalive = self
            .nodes
            .get(&sender.node_id)
            .and_then(|n| n.keepalive_interval_for(sender.ep_id))
            .unwrap_or(KEEPALIVE_INTERVAL);
        let now = self.now;
        let Some(link) = self.links.get_mut(ifname) else {
            return;
        };
        let key = (sender.node_id, sender.ep_id);
        if let Some(neighbour) = link.neighbours.get_mut(&key) {
            neighbour.last_addr = src;
            return;
        }
        link.neighbours.insert(
            key,
            super::neighbour::Neighbour::new(
                sender.node_id,
                sender.ep_id,
                src,
                now,
                keepalive,
            ),
        );
        debug!(
            "neighbour {}/#{} appeared on {ifname}",
            sender.node_id, sender.ep_id
        );
        self.links_dirty = true;
        self.schedule_prune();
        self.notify(Event::NeighbourAdded {
            ifname: ifname.to_string(),
            node_id: sender.node_id,
            ep_id: sender.ep_id,
        });
    }

    fn handle_network_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        src: SocketAddrV6,
        sender: Option<NodeEndpointTlv>,
        hash: Digest,
    ) {
        self.refresh_own_state();
        if hash == self.network_hash {
            // Consistent exchange.
            let now = self.now;
            let keepalive = sender.and_then(|s| {
                self.nodes
                    .get(&s.node_id)
                    .and_then(|n| n.keepalive_interval_for(s.ep_id))
            });
            if let Some(link) = self.links.get_mut(ifname) {
                link.trickle_consistent();
                if let Some(sender) = sender {
                    if let Some(neighbour) = link
                        .neighbours
                        .get_mut(&(sender.node_id, sender.ep_id))
                    {
                        neighbour.last_sync = now;
                        neighbour.keepalive_interval =
                            keepalive.unwrap_or(KEEPALIVE_INTERVAL);
                    }
                }
            }
        } else {
            debug!(
                "network state {hash} from {src} disagrees with ours {}",
                self.network_hash
            );
            let now = self.now;
            if let Some(link) = self.links.get_mut(ifname) {
                let rng = self.rng.as_mut();
                link.trickle_inconsistent(now, rng);
            }
            self.send_req_network_state(transport, ifname, src);
        }
    }

    fn handle_node_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        src: SocketAddrV6,
        state: &NodeStateTlv,
    ) {
        if state.node_id == self.own_id {
            self.handle_own_id_conflict(state.update_number, state.data_hash);
            return;
        }
        let stored = self.nodes.get(&state.node_id);
        let stored_update = stored.map(|n| n.update_number());
        match stored_update {
            Some(ours) if ours > state.update_number => {
                // The peer lags; push our copy.
                self.send_node_state(
                    transport,
                    ifname,
                    src,
                    state.node_id,
                    true,
                );
            }
            Some(ours) if ours == state.update_number => {}
            _ => match &state.node_data {
                Some(data) => {
                    if Digest::of(data) != state.data_hash {
                        debug!(
                            "node {} data does not match its hash, dropping",
                            state.node_id
                        );
                        return;
                    }
                    let origination =
                        self.now - Time::from(state.ms_since_origination);
                    self.upsert_node(
                        state.node_id,
                        state.update_number,
                        origination,
                        data.clone(),
                    );
                }
                None => {
                    self.send_req_node_state(
                        transport,
                        ifname,
                        src,
                        state.node_id,
                    );
                }
            },
        }
    }

    /// Make sure own node data and the network hash reflect all pending
    /// local changes before they are compared or transmitted.
    fn refresh_own_state(&mut self) {
        if self.links_dirty {
            self.links_dirty = false;
            self.tlvs_dirty = true;
        }
        if self.tlvs_dirty || self.republish_tlvs {
            self.flush_own_node();
        }
        if self.graph_dirty && self.now >= self.next_prune {
            self.prune();
        }
        if self.network_hash_dirty {
            self.recalculate_network_hash();
        }
    }

    fn node_state_tlv(&self, id: NodeId, include_data: bool) -> Option<HncpTlv> {
        let node = self.nodes.get(&id)?;
        Some(HncpTlv::NodeState(NodeStateTlv {
            node_id: node.id(),
            update_number: node.update_number(),
            // elapsed-at-send, the mirror of the receive-side conversion
            ms_since_origination: local_abs_to_remote_rel(
                node.origination_time(),
                self.now,
            ),
            data_hash: node.data_hash(),
            node_data: if include_data {
                Some(node.data().to_vec())
            } else {
                None
            },
        }))
    }

    /// Transmit a network-state summary on `ifname`: our endpoint tag,
    /// the network hash, and as many node summaries as fit.
    pub(crate) fn send_network_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        dst: Option<SocketAddrV6>,
    ) {
        self.refresh_own_state();
        let Some(link) = self.links.get(ifname) else {
            return;
        };
        let max = if dst.is_some() {
            MAX_PAYLOAD_SIZE
        } else {
            MAX_MULTICAST_SIZE
        };
        let mut message = vec![
            HncpTlv::NodeEndpoint(NodeEndpointTlv {
                node_id: self.own_id,
                ep_id: link.ep_id,
            }),
            HncpTlv::NetworkState(self.network_hash),
        ];
        let mut used = tlvs_buffer_len(message.iter());
        for id in self.nodes.keys().cloned().collect::<Vec<_>>() {
            if let Some(summary) = self.node_state_tlv(id, false) {
                let len = summary.buffer_len();
                if used + len > max {
                    break;
                }
                used += len;
                message.push(summary);
            }
        }
        self.send(transport, ifname, dst, &message);
    }

    fn send_node_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        dst: SocketAddrV6,
        id: NodeId,
        include_data: bool,
    ) {
        self.refresh_own_state();
        let Some(link) = self.links.get(ifname) else {
            return;
        };
        let ep_id = link.ep_id;
        let Some(state) = self.node_state_tlv(id, include_data) else {
            return;
        };
        let message = vec![
            HncpTlv::NodeEndpoint(NodeEndpointTlv {
                node_id: self.own_id,
                ep_id,
            }),
            state,
        ];
        self.send(transport, ifname, Some(dst), &message);
    }

    fn send_req_network_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        dst: SocketAddrV6,
    ) {
        let Some(link) = self.links.get(ifname) else {
            return;
        };
        let message = vec![
            HncpTlv::NodeEndpoint(NodeEndpointTlv {
                node_id: self.own_id,
                ep_id: link.ep_id,
            }),
            HncpTlv::RequestNetworkState,
        ];
        self.send(transport, ifname, Some(dst), &message);
    }

    fn send_req_node_state(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        dst: SocketAddrV6,
        id: NodeId,
    ) {
        let Some(link) = self.links.get(ifname) else {
            return;
        };
        let message = vec![
            HncpTlv::NodeEndpoint(NodeEndpointTlv {
                node_id: self.own_id,
                ep_id: link.ep_id,
            }),
            HncpTlv::RequestNodeState(id),
        ];
        self.send(transport, ifname, Some(dst), &message);
    }

    fn send(
        &mut self,
        transport: &mut dyn Transport,
        ifname: &str,
        dst: Option<SocketAddrV6>,
        message: &[HncpTlv],
    ) {
        let dst = dst.unwrap_or_else(|| {
            SocketAddrV6::new(self.cfg.multicast_group, self.cfg.port, 0, 0)
        });
        let bytes = emit_message(message);
        // Send failures are logged and otherwise ignored; the next
        // Trickle interval retries naturally.
        if let Err(e) = transport.sendto(ifname, &dst, &bytes) {
            warn!("unable to send {} bytes to {dst}: {e}", bytes.len());
        }
    }
}
