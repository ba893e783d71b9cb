// SPDX-License-Identifier: MIT

use anyhow::Context;
use netlink_packet_utils::{DecodeError, Parseable};

use crate::hash::{Digest, DIGEST_LEN};
use crate::tlv::{DefaultTlv, Tlv, TlvBuffer};

use super::dns::{DnsDelegatedZoneTlv, TrustVerdictTlv};
use super::external::ExternalConnectionTlv;
use super::neighbour::{KeepaliveIntervalTlv, NeighbourTlv, NodeEndpointTlv};
use super::node_state::{NodeStateBuffer, NodeStateTlv};
use super::prefix::{
    AssignedPrefixTlv, DelegatedPrefixTlv, NodeAddressTlv, PrefixPolicyTlv,
};
use super::version::VersionTlv;
use super::{
    NodeId, HNCP_T_ASSIGNED_PREFIX, HNCP_T_DELEGATED_PREFIX,
    HNCP_T_DHCPV4_DATA, HNCP_T_DHCPV6_DATA, HNCP_T_DNS_DELEGATED_ZONE,
    HNCP_T_EXTERNAL_CONNECTION, HNCP_T_KEEPALIVE_INTERVAL,
    HNCP_T_NETWORK_STATE, HNCP_T_NODE_ADDRESS, HNCP_T_NODE_ENDPOINT,
    HNCP_T_NODE_STATE, HNCP_T_PEER, HNCP_T_PREFIX_POLICY,
    HNCP_T_REQUEST_NETWORK_STATE, HNCP_T_REQUEST_NODE_STATE,
    HNCP_T_TRUST_VERDICT, HNCP_T_VERSION, NODE_ID_LEN,
};

/// Any registered record, plus `Other` for the rest.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum HncpTlv {
    RequestNetworkState,
    RequestNodeState(NodeId),
    NodeEndpoint(NodeEndpointTlv),
    NetworkState(Digest),
    NodeState(NodeStateTlv),
    Neighbour(NeighbourTlv),
    KeepaliveInterval(KeepaliveIntervalTlv),
    TrustVerdict(TrustVerdictTlv),
    Version(VersionTlv),
    ExternalConnection(ExternalConnectionTlv),
    DelegatedPrefix(DelegatedPrefixTlv),
    AssignedPrefix(AssignedPrefixTlv),
    NodeAddress(NodeAddressTlv),
    Dhcpv4Data(Vec<u8>),
    Dhcpv6Data(Vec<u8>),
    DnsDelegatedZone(DnsDelegatedZoneTlv),
    PrefixPolicy(PrefixPolicyTlv),
    Other(DefaultTlv),
}

impl Tlv for HncpTlv {
    fn kind(&self) -> u16 {
        match self {
            Self::RequestNetworkState => HNCP_T_REQUEST_NETWORK_STATE,
            Self::RequestNodeState(_) => HNCP_T_REQUEST_NODE_STATE,
            Self::NodeEndpoint(_) => HNCP_T_NODE_ENDPOINT,
            Self::NetworkState(_) => HNCP_T_NETWORK_STATE,
            Self::NodeState(_) => HNCP_T_NODE_STATE,
            Self::Neighbour(_) => HNCP_T_PEER,
            Self::KeepaliveInterval(_) => HNCP_T_KEEPALIVE_INTERVAL,
            Self::TrustVerdict(_) => HNCP_T_TRUST_VERDICT,
            Self::Version(_) => HNCP_T_VERSION,
            Self::ExternalConnection(_) => HNCP_T_EXTERNAL_CONNECTION,
            Self::DelegatedPrefix(_) => HNCP_T_DELEGATED_PREFIX,
            Self::AssignedPrefix(_) => HNCP_T_ASSIGNED_PREFIX,
            Self::NodeAddress(_) => HNCP_T_NODE_ADDRESS,
            Self::Dhcpv4Data(_) => HNCP_T_DHCPV4_DATA,
            Self::Dhcpv6Data(_) => HNCP_T_DHCPV6_DATA,
            Self::DnsDelegatedZone(_) => HNCP_T_DNS_DELEGATED_ZONE,
            Self::PrefixPolicy(_) => HNCP_T_PREFIX_POLICY,
            Self::Other(tlv) => tlv.kind(),
        }
    }

    fn value_len(&self) -> usize {
        match self {
            Self::RequestNetworkState => 0,
            Self::RequestNodeState(_) => NODE_ID_LEN,
            Self::NodeEndpoint(_) => super::neighbour::NODE_ENDPOINT_LEN,
            Self::NetworkState(_) => DIGEST_LEN,
            Self::NodeState(tlv) => tlv.value_len(),
            Self::Neighbour(_) => super::neighbour::NEIGHBOUR_LEN,
            Self::KeepaliveInterval(_) => {
                super::neighbour::KEEPALIVE_INTERVAL_LEN
            }
            Self::TrustVerdict(tlv) => tlv.value_len(),
            Self::Version(tlv) => tlv.value_len(),
            Self::ExternalConnection(tlv) => tlv.value_len(),
            Self::DelegatedPrefix(tlv) => tlv.value_len(),
            Self::AssignedPrefix(tlv) => tlv.value_len(),
            Self::NodeAddress(_) => super::prefix::NODE_ADDRESS_LEN,
            Self::Dhcpv4Data(data) | Self::Dhcpv6Data(data) => data.len(),
            Self::DnsDelegatedZone(tlv) => tlv.value_len(),
            Self::PrefixPolicy(tlv) => tlv.value_len(),
            Self::Other(tlv) => tlv.value_len(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Self::RequestNetworkState => {}
            Self::RequestNodeState(id) => buffer.copy_from_slice(&id.0),
            Self::NodeEndpoint(tlv) => tlv.emit_value(buffer),
            Self::NetworkState(hash) => buffer.copy_from_slice(&hash.0),
            Self::NodeState(tlv) => tlv.emit_value(buffer),
            Self::Neighbour(tlv) => tlv.emit_value(buffer),
            Self::KeepaliveInterval(tlv) => tlv.emit_value(buffer),
            Self::TrustVerdict(tlv) => tlv.emit_value(buffer),
            Self::Version(tlv) => tlv.emit_value(buffer),
            Self::ExternalConnection(tlv) => tlv.emit_value(buffer),
            Self::DelegatedPrefix(tlv) => tlv.emit_value(buffer),
            Self::AssignedPrefix(tlv) => tlv.emit_value(buffer),
            Self::NodeAddress(tlv) => tlv.emit_value(buffer),
            Self::Dhcpv4Data(data) | Self::Dhcpv6Data(data) => {
                buffer.copy_from_slice(data)
            }
            Self::DnsDelegatedZone(tlv) => tlv.emit_value(buffer),
            Self::PrefixPolicy(tlv) => tlv.emit_value(buffer),
            Self::Other(tlv) => tlv.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<TlvBuffer<&'a T>> for HncpTlv {
    fn parse(buf: &TlvBuffer<&'a T>) -> Result<Self, DecodeError> {
        let value = buf.value();
        Ok(match buf.kind() {
            HNCP_T_REQUEST_NETWORK_STATE => Self::RequestNetworkState,
            HNCP_T_REQUEST_NODE_STATE => Self::RequestNodeState(
                NodeId::from_slice(value)
                    .context("invalid node state request")?,
            ),
            HNCP_T_NODE_ENDPOINT => Self::NodeEndpoint(
                NodeEndpointTlv::parse_value(value)
                    .context("invalid node endpoint")?,
            ),
            HNCP_T_NETWORK_STATE => {
                if value.len() != DIGEST_LEN {
                    return Err(DecodeError::from(format!(
                        "network state hash needs {DIGEST_LEN} bytes, \
                        got {}",
                        value.len()
                    )));
                }
                let mut hash = [0u8; DIGEST_LEN];
                hash.copy_from_slice(value);
                Self::NetworkState(Digest(hash))
            }
            HNCP_T_NODE_STATE => Self::NodeState(
                NodeStateTlv::parse(&NodeStateBuffer::new_checked(value)?)
                    .context("invalid node state")?,
            ),
            HNCP_T_PEER => Self::Neighbour(
                NeighbourTlv::parse_value(value)
                    .context("invalid neighbour record")?,
            ),
            HNCP_T_KEEPALIVE_INTERVAL => Self::KeepaliveInterval(
                KeepaliveIntervalTlv::parse_value(value)
                    .context("invalid keepalive interval")?,
            ),
            HNCP_T_TRUST_VERDICT => Self::TrustVerdict(
                TrustVerdictTlv::parse_value(value)
                    .context("invalid trust verdict")?,
            ),
            HNCP_T_VERSION => Self::Version(
                VersionTlv::parse_value(value).context("invalid version")?,
            ),
            HNCP_T_EXTERNAL_CONNECTION => Self::ExternalConnection(
                ExternalConnectionTlv::parse_value(value)
                    .context("invalid external connection")?,
            ),
            HNCP_T_DELEGATED_PREFIX => Self::DelegatedPrefix(
                DelegatedPrefixTlv::parse_value(value)
                    .context("invalid delegated prefix")?,
            ),
            HNCP_T_ASSIGNED_PREFIX => Self::AssignedPrefix(
                AssignedPrefixTlv::parse_value(value)
                    .context("invalid assigned prefix")?,
            ),
            HNCP_T_NODE_ADDRESS => Self::NodeAddress(
                NodeAddressTlv::parse_value(value)
                    .context("invalid node address")?,
            ),
            HNCP_T_DHCPV4_DATA => Self::Dhcpv4Data(value.to_vec()),
            HNCP_T_DHCPV6_DATA => Self::Dhcpv6Data(value.to_vec()),
            HNCP_T_DNS_DELEGATED_ZONE => Self::DnsDelegatedZone(
                DnsDelegatedZoneTlv::parse_value(value)
                    .context("invalid dns delegated zone")?,
            ),
            HNCP_T_PREFIX_POLICY => Self::PrefixPolicy(
                PrefixPolicyTlv::parse_value(value)
                    .context("invalid prefix policy")?,
            ),
            _ => Self::Other(buf.into()),
        })
    }
}
