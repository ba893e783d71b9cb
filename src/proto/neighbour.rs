// SPDX-License-Identifier: MIT

use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::DecodeError;

use super::{NodeId, NODE_ID_LEN};

pub(crate) const NODE_ENDPOINT_LEN: usize = 12;
pub(crate) const NEIGHBOUR_LEN: usize = 16;
pub(crate) const KEEPALIVE_INTERVAL_LEN: usize = 8;

/// Sender tag present on every datagram: who is speaking, on which of its
/// endpoints.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NodeEndpointTlv {
    pub node_id: NodeId,
    pub ep_id: u32,
}

impl NodeEndpointTlv {
    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() != NODE_ENDPOINT_LEN {
            return Err(DecodeError::from(format!(
                "node endpoint needs {NODE_ENDPOINT_LEN} bytes, got {}",
                value.len()
            )));
        }
        Ok(NodeEndpointTlv {
            node_id: NodeId::from_slice(value)?,
            ep_id: BigEndian::read_u32(&value[NODE_ID_LEN..]),
        })
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        buffer[..NODE_ID_LEN].copy_from_slice(&self.node_id.0);
        BigEndian::write_u32(&mut buffer[NODE_ID_LEN..], self.ep_id);
    }
}

/// One entry of a node's published adjacency: the peer it hears, the
/// peer's endpoint, and the local endpoint it hears it on. An edge only
/// counts for reachability when both ends publish the mirror image.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NeighbourTlv {
    pub neighbour_node_id: NodeId,
    pub neighbour_ep_id: u32,
    pub local_ep_id: u32,
}

impl NeighbourTlv {
    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        // Exact length: anything else is a malformed record, not a longer
        // neighbour.
        if value.len() != NEIGHBOUR_LEN {
            return Err(DecodeError::from(format!(
                "neighbour record needs {NEIGHBOUR_LEN} bytes, got {}",
                value.len()
            )));
        }
        Ok(NeighbourTlv {
            neighbour_node_id: NodeId::from_slice(value)?,
            neighbour_ep_id: BigEndian::read_u32(&value[8..12]),
            local_ep_id: BigEndian::read_u32(&value[12..16]),
        })
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        buffer[..NODE_ID_LEN].copy_from_slice(&self.neighbour_node_id.0);
        BigEndian::write_u32(&mut buffer[8..12], self.neighbour_ep_id);
        BigEndian::write_u32(&mut buffer[12..16], self.local_ep_id);
    }
}

/// Advertised keepalive cadence. Endpoint id 0 applies to all endpoints.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct KeepaliveIntervalTlv {
    pub ep_id: u32,
    pub interval_ms: u32,
}

impl KeepaliveIntervalTlv {
    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() != KEEPALIVE_INTERVAL_LEN {
            return Err(DecodeError::from(format!(
                "keepalive interval needs {KEEPALIVE_INTERVAL_LEN} bytes, \
                got {}",
                value.len()
            )));
        }
        Ok(KeepaliveIntervalTlv {
            ep_id: BigEndian::read_u32(&value[..4]),
            interval_ms: BigEndian::read_u32(&value[4..8]),
        })
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[..4], self.ep_id);
        BigEndian::write_u32(&mut buffer[4..8], self.interval_ms);
    }
}
