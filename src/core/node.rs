// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use crate::hash::Digest;
use crate::proto::{
    KeepaliveIntervalTlv, NeighbourTlv, NodeId, HNCP_T_KEEPALIVE_INTERVAL,
    HNCP_T_PEER, HNCP_T_VERSION, VersionTlv,
};
use crate::time::Time;
use crate::tlv::{TlvBuffer, TlvsIterator};

/// One participant of the network: its identifier, the version counter of
/// its data, and the data itself as the raw canonical record container.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    update_number: u32,
    /// Origination instant of the current data, on the local time scale.
    origination_time: Time,
    data: Vec<u8>,
    data_hash: Digest,
    /// Instant of the last prune that found this node reachable.
    pub(crate) last_reachable_prune: Time,
    /// Lazily rebuilt kind -> byte-range index over `data`.
    tlv_index: Option<HashMap<u16, Vec<(usize, usize)>>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, now: Time) -> Self {
        Node {
            id,
            update_number: 0,
            origination_time: now,
            data: Vec::new(),
            data_hash: Digest::of(&[]),
            last_reachable_prune: now,
            tlv_index: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn update_number(&self) -> u32 {
        self.update_number
    }

    pub fn origination_time(&self) -> Time {
        self.origination_time
    }

    /// The node's record container, canonical form.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_hash(&self) -> Digest {
        self.data_hash
    }

    pub(crate) fn set_data(
        &mut self,
        update_number: u32,
        origination_time: Time,
        data: Vec<u8>,
    ) {
        self.update_number = update_number;
        self.origination_time = origination_time;
        self.data_hash = Digest::of(&data);
        self.data = data;
        self.tlv_index = None;
    }

    /// Iterate the container's records.
    pub fn tlvs(&self) -> TlvsIterator<&[u8]> {
        TlvsIterator::new(self.data.as_slice())
    }

    fn build_index(&mut self) {
        let mut index: HashMap<u16, Vec<(usize, usize)>> = HashMap::new();
        let mut position = 0usize;
        for tlv in TlvsIterator::new(self.data.as_slice()) {
            let Ok(tlv) = tlv else { break };
            let len = tlv.padded_length();
            index
                .entry(tlv.kind())
                .or_default()
                .push((position, position + len));
            position += len;
        }
        self.tlv_index = Some(index);
    }

    /// Byte ranges of all records of `kind`, via the lazily built index.
    pub(crate) fn ranges_of_type(&mut self, kind: u16) -> Vec<(usize, usize)> {
        if self.tlv_index.is_none() {
            self.build_index();
        }
        self.tlv_index
            .as_ref()
            .and_then(|ix| ix.get(&kind))
            .cloned()
            .unwrap_or_default()
    }

    /// All neighbour records this node currently publishes.
    pub fn neighbours(&self) -> Vec<NeighbourTlv> {
        self.typed_of_kind(HNCP_T_PEER, |buf| {
            NeighbourTlv::parse_value(buf.value()).ok()
        })
    }

    /// The keepalive interval this node advertises for `ep_id`, if any
    /// (an entry for endpoint 0 covers all endpoints).
    pub fn keepalive_interval_for(&self, ep_id: u32) -> Option<u32> {
        let mut wildcard = None;
        for ka in self.typed_of_kind(HNCP_T_KEEPALIVE_INTERVAL, |buf| {
            KeepaliveIntervalTlv::parse_value(buf.value()).ok()
        }) {
            if ka.ep_id == ep_id {
                return Some(ka.interval_ms);
            }
            if ka.ep_id == 0 {
                wildcard = Some(ka.interval_ms);
            }
        }
        wildcard
    }

    /// The node's advertised capability word, if it publishes one.
    pub fn capabilities(&self) -> Option<u32> {
        self.typed_of_kind(HNCP_T_VERSION, |buf| {
            VersionTlv::parse_value(buf.value()).ok()
        })
        .into_iter()
        .next()
        .map(|v| v.capabilities)
    }

    fn typed_of_kind<T>(
        &self,
        kind: u16,
        parse: impl Fn(&TlvBuffer<&[u8]>) -> Option<T>,
    ) -> Vec<T> {
        let mut out = Vec::new();
        for tlv in self.tlvs() {
            let Ok(tlv) = tlv else { break };
            if tlv.kind() == kind {
                if let Some(v) = parse(&tlv) {
                    out.push(v);
                }
            }
        }
        out
    }
}

/// Split a canonical container into its individual encoded records
/// (padding included). Used for change diffing and event payloads.
pub(crate) fn container_records(data: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut position = 0usize;
    for tlv in TlvsIterator::new(data) {
        let Ok(tlv) = tlv else { break };
        let len = tlv.padded_length();
        out.push(data[position..position + len].to_vec());
        position += len;
    }
    out
}
