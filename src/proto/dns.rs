// SPDX-License-Identifier: MIT

use std::net::Ipv6Addr;

use netlink_packet_utils::DecodeError;

use crate::ip::{parse_ipv6_addr, IPV6_ADDR_LEN};

pub(crate) const DNS_DELEGATED_ZONE_HEADER_LEN: usize = 17;

/// Verdict byte plus three reserved bytes.
const TRUST_VERDICT_HEADER_LEN: usize = 4;
/// Bound on the NUL-terminated common name.
const TRUST_VERDICT_CNAME_MAX: usize = 64;

/// A DNS zone this node serves for the network, rooted at `address`.
/// The zone travels in DNS wire label form, uncompressed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DnsDelegatedZoneTlv {
    pub address: Ipv6Addr,
    pub flags: u8,
    pub zone: Vec<u8>,
}

impl DnsDelegatedZoneTlv {
    pub(crate) fn value_len(&self) -> usize {
        DNS_DELEGATED_ZONE_HEADER_LEN + self.zone.len()
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        buffer[..IPV6_ADDR_LEN].copy_from_slice(&self.address.octets());
        buffer[IPV6_ADDR_LEN] = self.flags;
        buffer[DNS_DELEGATED_ZONE_HEADER_LEN..].copy_from_slice(&self.zone);
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() < DNS_DELEGATED_ZONE_HEADER_LEN {
            return Err(DecodeError::from(format!(
                "dns delegated zone needs at least \
                {DNS_DELEGATED_ZONE_HEADER_LEN} bytes, got {}",
                value.len()
            )));
        }
        Ok(DnsDelegatedZoneTlv {
            address: parse_ipv6_addr(&value[..IPV6_ADDR_LEN])?,
            flags: value[IPV6_ADDR_LEN],
            zone: value[DNS_DELEGATED_ZONE_HEADER_LEN..].to_vec(),
        })
    }
}

/// Trust statement about another node, named by CNAME. Carried and
/// re-flooded; no trust state machine is built on top of it here.
///
/// Value layout: verdict byte, three reserved zero bytes, then the
/// NUL-terminated common name.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TrustVerdictTlv {
    pub verdict: u8,
    pub cname: String,
}

impl TrustVerdictTlv {
    pub(crate) fn value_len(&self) -> usize {
        TRUST_VERDICT_HEADER_LEN + self.cname.len() + 1
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        buffer[0] = self.verdict;
        buffer[1..TRUST_VERDICT_HEADER_LEN].fill(0);
        buffer[TRUST_VERDICT_HEADER_LEN
            ..TRUST_VERDICT_HEADER_LEN + self.cname.len()]
            .copy_from_slice(self.cname.as_bytes());
        buffer[TRUST_VERDICT_HEADER_LEN + self.cname.len()] = 0;
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        if value.len() < TRUST_VERDICT_HEADER_LEN + 1
            || value.len()
                > TRUST_VERDICT_HEADER_LEN + TRUST_VERDICT_CNAME_MAX
        {
            return Err(DecodeError::from(format!(
                "trust verdict of {} bytes out of range",
                value.len()
            )));
        }
        if value[value.len() - 1] != 0 {
            return Err(DecodeError::from(
                "trust verdict cname is not NUL terminated".to_string(),
            ));
        }
        let cname = std::str::from_utf8(
            &value[TRUST_VERDICT_HEADER_LEN..value.len() - 1],
        )
        .map_err(|e| DecodeError::from(format!("bad cname: {e}")))?
        .to_string();
        Ok(TrustVerdictTlv {
            verdict: value[0],
            cname,
        })
    }
}
