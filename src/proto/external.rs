// SPDX-License-Identifier: MIT

use anyhow::Context;
use netlink_packet_utils::{DecodeError, Parseable};

use crate::tlv::{emit_tlvs, tlvs_buffer_len, TlvsIterator};

use super::attribute::HncpTlv;
use super::prefix::DelegatedPrefixTlv;

/// One uplink of the advertising node: its delegated prefixes plus the
/// DHCP option blobs learned on that uplink, all as nested records.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ExternalConnectionTlv {
    pub tlvs: Vec<HncpTlv>,
}

impl ExternalConnectionTlv {
    pub(crate) fn value_len(&self) -> usize {
        tlvs_buffer_len(self.tlvs.iter())
    }

    pub(crate) fn emit_value(&self, buffer: &mut [u8]) {
        emit_tlvs(self.tlvs.iter(), buffer)
    }

    pub(crate) fn parse_value(value: &[u8]) -> Result<Self, DecodeError> {
        let mut tlvs = Vec::new();
        for tlv in TlvsIterator::new(value) {
            tlvs.push(
                HncpTlv::parse(&tlv?)
                    .context("invalid external connection sub-record")?,
            );
        }
        Ok(ExternalConnectionTlv { tlvs })
    }

    pub fn delegated_prefixes(
        &self,
    ) -> impl Iterator<Item = &DelegatedPrefixTlv> {
        self.tlvs.iter().filter_map(|tlv| match tlv {
            HncpTlv::DelegatedPrefix(dp) => Some(dp),
            _ => None,
        })
    }

    pub fn dhcpv6_data(&self) -> Option<&[u8]> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            HncpTlv::Dhcpv6Data(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    pub fn dhcpv4_data(&self) -> Option<&[u8]> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            HncpTlv::Dhcpv4Data(data) => Some(data.as_slice()),
            _ => None,
        })
    }
}
