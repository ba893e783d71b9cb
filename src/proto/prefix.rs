// SPDX-License-Identifier: MIT

use std::net::Ipv6Addr;

use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::DecodeError;

use crate::ip::{bits_to_bytes, parse_ipv6_addr, Prefix, IPV6_ADDR_LEN};
use crate::tlv::{emit_tlvs, tlv_align, tlvs_buffer_len, TlvsIterator};

use super::attribute::HncpTlv;

pub(crate) const ASSIGNED_PREFIX_HEADER_LEN: usize = 6;
pub(crate) const DELEGATED_PREFIX_HEADER_LEN: usize = 9;
pub(crate) const NODE_ADDRESS_LEN: usize = 20;

/// Priority nibble carried in the ASSIGNED-PREFIX flags byte.
const AP_FLAG_PRIORITY_MASK: u8 = 0x0f;

/// A prefix one node has claimed for one of its endpoints.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AssignedPrefixTlv {
    pub ep_id: u32,
    pub priority: u8,
    pub prefix: Prefix,
}

impl AssignedPrefixTlv {
    pub(crate) fn value_len(&self) -> usize {
        ASSIGNED_PREFIX_HEADER_LEN + self.prefix.wire_len()
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[..4], self.ep_id);
        buffer[4] = self.priority & AP_FLAG_PRIORITY_MASK;
        buffer[5] = self.prefix.plen();
        self.prefix.emit_wire(&mut buffer[ASSIGNED_PREFIX_HEADER_LEN..]);
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() < ASSIGNED_PREFIX_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "assigned prefix needs at least \
                {ASSIGNED_PREFIX_HEADER_LEN} bytes, got {}",
                value.len()
            )));
        }
        let plen = value[5];
        let prefix =
            Prefix::from_wire(plen, &value[ASSIGNED_PREFIX_HEADER_LEN..])
                .context("invalid assigned prefix")?;
        Ok(AssignedPrefixTlv {
            ep_id: BigEndian::read_u32(&value[..4]),
            priority: value[4] & AP_FLAG_PRIORITY_MASK,
            prefix,
        })
    }
}

/// A prefix delegated to the network, with lifetimes expressed relative to
/// the advertising node's origination instant. Nested records (DHCPv6
/// data, prefix policy) follow the padded prefix bytes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DelegatedPrefixTlv {
    pub ms_valid: u32,
    pub ms_preferred: u32,
    pub prefix: Prefix,
    pub sub_tlvs: Vec<HncpTlv>,
}

impl DelegatedPrefixTlv {
    fn prefix_part_len(&self) -> usize {
        DELEGATED_PREFIX_HEADER_LEN + self.prefix.wire_len()
    }

    pub(crate) fn value_len(&self) -> usize {
        if self.sub_tlvs.is_empty() {
            self.prefix_part_len()
        } else {
            tlv_align(self.prefix_part_len())
                + tlvs_buffer_len(self.sub_tlvs.iter())
        }
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[..4], self.ms_valid);
        BigEndian::write_u32(&mut buffer[4..8], self.ms_preferred);
        buffer[8] = self.prefix.plen();
        self.prefix.emit_wire(&mut buffer[DELEGATED_PREFIX_HEADER_LEN..]);
        if !self.sub_tlvs.is_empty() {
            let start = tlv_align(self.prefix_part_len());
            buffer[self.prefix_part_len()..start].fill(0);
            emit_tlvs(self.sub_tlvs.iter(), &mut buffer[start..]);
        }
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        use netlink_packet_utils::Parseable;

        if value.len() < DELEGATED_PREFIX_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "delegated prefix needs at least \
                {DELEGATED_PREFIX_HEADER_LEN} bytes, got {}",
                value.len()
            )));
        }
        let plen = value[8];
        let prefix =
            Prefix::from_wire(plen, &value[DELEGATED_PREFIX_HEADER_LEN..])
                .context("invalid delegated prefix")?;
        let fixed = DELEGATED_PREFIX_HEADER_LEN + bits_to_bytes(plen);
        let sub_start = tlv_align(fixed);
        let mut sub_tlvs = Vec::new();
        if value.len() > sub_start {
            for tlv in TlvsIterator::new(&value[sub_start..]) {
                sub_tlvs.push(
                    HncpTlv::parse(&tlv?)
                        .context("invalid delegated prefix sub-record")?,
                );
            }
        }
        Ok(DelegatedPrefixTlv {
            ms_valid: BigEndian::read_u32(&value[..4]),
            ms_preferred: BigEndian::read_u32(&value[4..8]),
            prefix,
            sub_tlvs,
        })
    }

    /// Nested DHCPv6 data, if any.
    pub fn dhcpv6_data(&self) -> Option<&[u8]> {
        self.sub_tlvs.iter().find_map(|tlv| match tlv {
            HncpTlv::Dhcpv6Data(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Nested destination-prefix policy, if any.
    pub fn destination(&self) -> Option<&Prefix> {
        self.sub_tlvs.iter().find_map(|tlv| match tlv {
            HncpTlv::PrefixPolicy(PrefixPolicyTlv::Destination(p)) => Some(p),
            _ => None,
        })
    }
}

/// The single router address a node claims on one of its endpoints.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NodeAddressTlv {
    pub ep_id: u32,
    pub address: Ipv6Addr,
}

impl NodeAddressTlv {
    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() != NODE_ADDRESS_LEN {
            return Err(DecodeError::from(format!(
                "node address needs {NODE_ADDRESS_LEN} bytes, got {}",
                value.len()
            )));
        }
        Ok(NodeAddressTlv {
            ep_id: BigEndian::read_u32(&value[..4]),
            address: parse_ipv6_addr(&value[4..])?,
        })
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[..4], self.ep_id);
        buffer[4..4 + IPV6_ADDR_LEN].copy_from_slice(&self.address.octets());
    }
}

/// Routing policy attached to a delegated prefix. Policy types up to 128
/// name a destination prefix (that many bits of it); anything else is
/// carried opaquely.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PrefixPolicyTlv {
    Destination(Prefix),
    Other { policy: u8, data: Vec<u8> },
}

impl PrefixPolicyTlv {
    pub(crate) fn value_len(&self) -> usize {
        match self {
            Self::Destination(p) => 1 + p.wire_len(),
            Self::Other { data, .. } => 1 + data.len(),
        }
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Self::Destination(p) => {
                buffer[0] = p.plen();
                p.emit_wire(&mut buffer[1..]);
            }
            Self::Other { policy, data } => {
                buffer[0] = *policy;
                buffer[1..1 + data.len()].copy_from_slice(data);
            }
        }
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.is_empty() {
            return Err(DecodeError::from(
                "prefix policy needs at least the policy byte".to_string(),
            ));
        }
        let policy = value[0];
        if policy <= 128 && value.len() == 1 + bits_to_bytes(policy) {
            Ok(Self::Destination(
                Prefix::from_wire(policy, &value[1..])
                    .context("invalid prefix policy destination")?,
            ))
        } else {
            Ok(Self::Other {
                policy,
                data: value[1..].to_vec(),
            })
        }
    }
}
