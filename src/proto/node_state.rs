// SPDX-License-Identifier: MIT

use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::{DecodeError, Parseable};

use crate::hash::{Digest, DIGEST_LEN};

use super::{NodeId, NODE_ID_LEN};

pub(crate) const NODE_STATE_HEADER_LEN: usize = 24;

const UPDATE_NUMBER: std::ops::Range<usize> = 8..12;
const MS_SINCE_ORIGINATION: std::ops::Range<usize> = 12..16;
const DATA_HASH: std::ops::Range<usize> = 16..24;

/// View over a NODE-STATE value.
///
/// ```no_rust
/// 0                                                                  32
/// +----------------+----------------+----------------+----------------+
/// |                       node identifier (8)                         |
/// +----------------+----------------+----------------+----------------+
/// |                           update number                           |
/// +----------------+----------------+----------------+----------------+
/// |                       ms since origination                        |
/// +----------------+----------------+----------------+----------------+
/// |                        node data hash (8)                         |
/// +----------------+----------------+----------------+----------------+
/// |              optional node data (nested records)                  |
/// +----------------+----------------+----------------+----------------+
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NodeStateBuffer<T> {
    buffer: T,
}

impl<T: AsRef<[u8]>> NodeStateBuffer<T> {
    pub fn new(buffer: T) -> Self {
        NodeStateBuffer { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Self, DecodeError> {
        let buf = Self::new(buffer);
        buf.check_buffer_length()?;
        Ok(buf)
    }

    fn check_buffer_length(&self) -> Result<(), DecodeError> {
        let len = self.buffer.as_ref().len();
        if len < NODE_STATE_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "node state needs at least {NODE_STATE_HEADER_LEN} bytes, \
                got {len}"
            )));
        }
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(&self.buffer.as_ref()[..NODE_ID_LEN]);
        NodeId(id)
    }

    pub fn update_number(&self) -> u32 {
        BigEndian::read_u32(&self.buffer.as_ref()[UPDATE_NUMBER])
    }

    pub fn ms_since_origination(&self) -> u32 {
        BigEndian::read_u32(&self.buffer.as_ref()[MS_SINCE_ORIGINATION])
    }

    pub fn data_hash(&self) -> Digest {
        let mut hash = [0u8; DIGEST_LEN];
        hash.copy_from_slice(&self.buffer.as_ref()[DATA_HASH]);
        Digest(hash)
    }

    pub fn node_data(&self) -> &[u8] {
        &self.buffer.as_ref()[NODE_STATE_HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> NodeStateBuffer<T> {
    pub fn set_node_id(&mut self, id: &NodeId) {
        self.buffer.as_mut()[..NODE_ID_LEN].copy_from_slice(&id.0)
    }

    pub fn set_update_number(&mut self, value: u32) {
        BigEndian::write_u32(&mut self.buffer.as_mut()[UPDATE_NUMBER], value)
    }

    pub fn set_ms_since_origination(&mut self, value: u32) {
        BigEndian::write_u32(
            &mut self.buffer.as_mut()[MS_SINCE_ORIGINATION],
            value,
        )
    }

    pub fn set_data_hash(&mut self, hash: &Digest) {
        self.buffer.as_mut()[DATA_HASH].copy_from_slice(&hash.0)
    }

    pub fn node_data_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[NODE_STATE_HEADER_LEN..]
    }
}

/// Versioned summary of one node, optionally carrying its full record
/// container. `node_data` stays a raw byte blob here; consumers parse it
/// when (and if) they care about the contents.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NodeStateTlv {
    pub node_id: NodeId,
    pub update_number: u32,
    pub ms_since_origination: u32,
    pub data_hash: Digest,
    pub node_data: Option<Vec<u8>>,
}

impl NodeStateTlv {
    pub(crate) fn value_len(&self) -> usize {
        NODE_STATE_HEADER_LEN
            + self.node_data.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        let mut buf = NodeStateBuffer::new(buffer);
        buf.set_node_id(&self.node_id);
        buf.set_update_number(self.update_number);
        buf.set_ms_since_origination(self.ms_since_origination);
        buf.set_data_hash(&self.data_hash);
        if let Some(data) = &self.node_data {
            buf.node_data_mut().copy_from_slice(data);
        }
    }
}

impl<T: AsRef<[u8]>> Parseable<NodeStateBuffer<T>> for NodeStateTlv {
    fn parse(buf: &NodeStateBuffer<T>) -> Result<Self, DecodeError> {
        let data = buf.node_data();
        Ok(NodeStateTlv {
            node_id: buf.node_id(),
            update_number: buf.update_number(),
            ms_since_origination: buf.ms_since_origination(),
            data_hash: buf.data_hash(),
            node_data: if data.is_empty() {
                None
            } else {
                Some(data.to_vec())
            },
        })
    }
}
