// SPDX-License-Identifier: MIT

use netlink_packet_utils::Parseable;

use crate::hash::Digest;
use crate::tlv::{tlv_to_bytes, DefaultTlv, Tlv, TlvBuffer};

use super::*;

fn parse_one(data: &[u8]) -> HncpTlv {
    HncpTlv::parse(&TlvBuffer::new_checked(data).unwrap()).unwrap()
}

fn emit_one(tlv: &HncpTlv) -> Vec<u8> {
    tlv_to_bytes(tlv)
}

#[test]
fn test_node_endpoint() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x03, 0x00, 0x0c,
        // node id
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        // endpoint id
        0x00, 0x00, 0x00, 0x01,
    ];
    let expected = HncpTlv::NodeEndpoint(NodeEndpointTlv {
        node_id: NodeId([1, 2, 3, 4, 5, 6, 7, 8]),
        ep_id: 1,
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_network_state() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x04, 0x00, 0x08,
        0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04,
    ];
    let expected = HncpTlv::NetworkState(Digest([
        0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04,
    ]));
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_node_state_summary() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x05, 0x00, 0x18,
        // node id
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        // update number 7
        0x00, 0x00, 0x00, 0x07,
        // 1500 ms since origination
        0x00, 0x00, 0x05, 0xdc,
        // data hash
        0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04,
    ];
    let expected = HncpTlv::NodeState(NodeStateTlv {
        node_id: NodeId([1, 2, 3, 4, 5, 6, 7, 8]),
        update_number: 7,
        ms_since_origination: 1500,
        data_hash: Digest([0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04]),
        node_data: None,
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_node_state_with_data() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x05, 0x00, 0x24,
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        0x00, 0x00, 0x00, 0x07,
        0x00, 0x00, 0x05, 0xdc,
        0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04,
        // container: one keepalive interval record
        0x00, 0x09, 0x00, 0x08,
        0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x4e, 0x20,
    ];
    let HncpTlv::NodeState(state) = parse_one(&data) else {
        panic!("not a node state");
    };
    assert_eq!(state.update_number, 7);
    let container = state.node_data.as_deref().unwrap();
    assert_eq!(
        parse_tlvs(container).unwrap(),
        vec![HncpTlv::KeepaliveInterval(KeepaliveIntervalTlv {
            ep_id: 0,
            interval_ms: 20_000,
        })]
    );
    assert_eq!(emit_one(&HncpTlv::NodeState(state)), data);
}

#[test]
fn test_neighbour() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x08, 0x00, 0x10,
        // neighbour node id
        0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
        // neighbour endpoint, local endpoint
        0x00, 0x00, 0x00, 0x02,
        0x00, 0x00, 0x00, 0x01,
    ];
    let expected = HncpTlv::Neighbour(NeighbourTlv {
        neighbour_node_id: NodeId([8, 7, 6, 5, 4, 3, 2, 1]),
        neighbour_ep_id: 2,
        local_ep_id: 1,
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_neighbour_length_is_exact() {
    // One trailing byte too many: whole record is rejected.
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x08, 0x00, 0x11,
        0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
        0x00, 0x00, 0x00, 0x02,
        0x00, 0x00, 0x00, 0x01,
        0xff, 0x00, 0x00, 0x00,
    ];
    let buf = TlvBuffer::new_checked(&data[..]).unwrap();
    assert!(HncpTlv::parse(&buf).is_err());
}

#[test]
fn test_keepalive_interval() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x09, 0x00, 0x08,
        // endpoint id
        0x00, 0x00, 0x00, 0x01,
        // 20000 ms
        0x00, 0x00, 0x4e, 0x20,
    ];
    let expected = HncpTlv::KeepaliveInterval(KeepaliveIntervalTlv {
        ep_id: 1,
        interval_ms: 20_000,
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_dhcpv6_data() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x26, 0x00, 0x06,
        // opaque DHCPv6 option bytes (option 23, length 2)
        0x00, 0x17, 0x00, 0x02, 0x0a, 0x0b,
        // padding
        0x00, 0x00,
    ];
    let expected = HncpTlv::Dhcpv6Data(vec![0x00, 0x17, 0x00, 0x02, 0x0a, 0x0b]);
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_dhcpv4_data() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x25, 0x00, 0x06,
        // opaque DHCPv4 option bytes (option 6, length 4)
        0x06, 0x04, 0x0a, 0x00, 0x00, 0x01,
        // padding
        0x00, 0x00,
    ];
    let expected =
        HncpTlv::Dhcpv4Data(vec![0x06, 0x04, 0x0a, 0x00, 0x00, 0x01]);
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_assigned_prefix() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x23, 0x00, 0x0e,
        // endpoint id
        0x00, 0x00, 0x00, 0x01,
        // flags (priority 2), prefix length 64
        0x02, 0x40,
        // 2001:db8:0:42::/64
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x42,
        // padding
        0x00, 0x00,
    ];
    let expected = HncpTlv::AssignedPrefix(AssignedPrefixTlv {
        ep_id: 1,
        priority: 2,
        prefix: "2001:db8:0:42::/64".parse().unwrap(),
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_node_address() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x24, 0x00, 0x14,
        0x00, 0x00, 0x00, 0x02,
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    ];
    let expected = HncpTlv::NodeAddress(NodeAddressTlv {
        ep_id: 2,
        address: "2001:db8::1".parse().unwrap(),
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_delegated_prefix_with_sub_records() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x22, 0x00, 0x18,
        // valid 3600000 ms, preferred 1800000 ms
        0x00, 0x36, 0xee, 0x80,
        0x00, 0x1b, 0x77, 0x40,
        // plen 56, 2001:db8::/56 (7 prefix bytes, header+prefix = 16,
        // already aligned)
        0x38,
        0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00, 0x00,
        // nested DHCPv6 data
        0x00, 0x26, 0x00, 0x02,
        0xde, 0xad, 0x00, 0x00,
    ];
    let expected = HncpTlv::DelegatedPrefix(DelegatedPrefixTlv {
        ms_valid: 3_600_000,
        ms_preferred: 1_800_000,
        prefix: "2001:db8::/56".parse().unwrap(),
        sub_tlvs: vec![HncpTlv::Dhcpv6Data(vec![0xde, 0xad])],
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);

    let HncpTlv::DelegatedPrefix(dp) = parse_one(&data) else {
        unreachable!()
    };
    assert_eq!(dp.dhcpv6_data(), Some(&[0xde, 0xad][..]));
}

#[test]
fn test_external_connection() {
    let dp = DelegatedPrefixTlv {
        ms_valid: 1000,
        ms_preferred: 500,
        prefix: "2001:db8::/56".parse().unwrap(),
        sub_tlvs: vec![],
    };
    let ec = HncpTlv::ExternalConnection(ExternalConnectionTlv {
        tlvs: vec![
            HncpTlv::DelegatedPrefix(dp.clone()),
            HncpTlv::Dhcpv6Data(vec![1, 2, 3]),
        ],
    });
    let bytes = emit_one(&ec);
    let parsed = parse_one(&bytes);
    assert_eq!(parsed, ec);
    let HncpTlv::ExternalConnection(parsed) = parsed else {
        unreachable!()
    };
    assert_eq!(parsed.delegated_prefixes().collect::<Vec<_>>(), vec![&dp]);
    assert_eq!(parsed.dhcpv6_data(), Some(&[1, 2, 3][..]));
}

#[test]
fn test_prefix_policy_destination() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x2b, 0x00, 0x01,
        // policy type 0: default route destination ::/0
        0x00, 0x00, 0x00, 0x00,
    ];
    let expected = HncpTlv::PrefixPolicy(PrefixPolicyTlv::Destination(
        "::/0".parse().unwrap(),
    ));
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_trust_verdict() {
    #[rustfmt::skip]
    let data = vec![
        0x00, 0x0a, 0x00, 0x10,
        // verdict, 3 reserved bytes
        0x01, 0x00, 0x00, 0x00,
        b'r', b'o', b'u', b't', b'e', b'r', b'.', b'h', b'o', b'm', b'e',
        0x00,
    ];
    let expected = HncpTlv::TrustVerdict(TrustVerdictTlv {
        verdict: 1,
        cname: "router.home".to_string(),
    });
    assert_eq!(parse_one(&data), expected);
    assert_eq!(emit_one(&expected), data);
}

#[test]
fn test_version() {
    let expected = HncpTlv::Version(VersionTlv {
        capabilities: 0x0000_0001,
        user_agent: "hncp/0.1.0".to_string(),
    });
    let bytes = emit_one(&expected);
    assert_eq!(parse_one(&bytes), expected);
}

#[test]
fn test_dns_delegated_zone() {
    let expected = HncpTlv::DnsDelegatedZone(DnsDelegatedZoneTlv {
        address: "2001:db8::53".parse().unwrap(),
        flags: 0x02,
        // "home." in wire label form
        zone: vec![4, b'h', b'o', b'm', b'e', 0],
    });
    let bytes = emit_one(&expected);
    assert_eq!(parse_one(&bytes), expected);
}

#[test]
fn test_unknown_type_round_trips() {
    let expected =
        HncpTlv::Other(DefaultTlv::new(0x700, vec![0xca, 0xfe, 0xba, 0xbe]));
    let bytes = emit_one(&expected);
    assert_eq!(parse_one(&bytes), expected);
}

#[test]
fn test_message_round_trip_after_sort() {
    let message = vec![
        HncpTlv::NodeEndpoint(NodeEndpointTlv {
            node_id: NodeId([1, 2, 3, 4, 5, 6, 7, 8]),
            ep_id: 1,
        }),
        HncpTlv::NetworkState(Digest([1, 2, 3, 4, 5, 6, 7, 8])),
        HncpTlv::RequestNetworkState,
    ];
    let bytes = emit_message(&message);
    assert_eq!(parse_tlvs(&bytes).unwrap(), message);
}

#[test]
fn test_malformed_record_fails_whole_buffer() {
    let mut bytes = emit_message(&[
        HncpTlv::RequestNetworkState,
        HncpTlv::NetworkState(Digest([1, 2, 3, 4, 5, 6, 7, 8])),
    ]);
    // Corrupt the second record's length so it runs past the buffer.
    bytes[6] = 0xff;
    assert!(parse_tlvs(&bytes).is_err());
}
