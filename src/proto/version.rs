// SPDX-License-Identifier: MIT

use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::DecodeError;

pub(crate) const VERSION_HEADER_LEN: usize = 4;

/// Capability word every node publishes in its own data. Nodes whose
/// capabilities disagree with ours keep flooding but their records are
/// ignored by the allocator.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VersionTlv {
    pub capabilities: u32,
    pub user_agent: String,
}

impl VersionTlv {
    pub(crate) fn value_len(&self) -> usize {
        VERSION_HEADER_LEN + self.user_agent.len()
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[..4], self.capabilities);
        buffer[VERSION_HEADER_LEN..]
            .copy_from_slice(self.user_agent.as_bytes());
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() < VERSION_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "version record needs at least {VERSION_HEADER_LEN} bytes, \
                got {}",
                value.len()
            )));
        }
        let user_agent =
            String::from_utf8_lossy(&value[VERSION_HEADER_LEN..]).into_owned();
        Ok(VersionTlv {
            capabilities: BigEndian::read_u32(&value[..4]),
            user_agent,
        })
    }
}
