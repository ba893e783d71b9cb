// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn parse_single_record() {
    #[rustfmt::skip]
    let data = [
        // type 4, length 8
        0x00, 0x04, 0x00, 0x08,
        0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88,
    ];
    let buf = TlvBuffer::new_checked(&data[..]).unwrap();
    assert_eq!(buf.kind(), 4);
    assert_eq!(buf.length(), 8);
    assert_eq!(buf.value(), &data[4..12]);
    assert_eq!(buf.padded_length(), 12);
}

#[test]
fn iterate_with_padding() {
    #[rustfmt::skip]
    let data = [
        // type 1, length 0
        0x00, 0x01, 0x00, 0x00,
        // type 2, length 5, padded to 8
        0x00, 0x02, 0x00, 0x05,
        0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x00, 0x00, 0x00,
        // type 3, length 2, final record without padding
        0x00, 0x03, 0x00, 0x02,
        0xff, 0xfe,
    ];
    let records: Vec<_> = TlvsIterator::new(&data[..])
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].kind(), 1);
    assert_eq!(records[1].value(), &[0x0a, 0x0b, 0x0c, 0x0d, 0x0e]);
    assert_eq!(records[2].kind(), 3);
    assert_eq!(records[2].value(), &[0xff, 0xfe]);
}

#[test]
fn truncated_record_is_an_error() {
    // type 2, length 5, but only 2 value bytes present
    let data = [0x00, 0x02, 0x00, 0x05, 0x0a, 0x0b];
    let mut iter = TlvsIterator::new(&data[..]);
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());
}

#[test]
fn truncated_header_is_an_error() {
    let data = [0x00, 0x02, 0x00];
    let mut iter = TlvsIterator::new(&data[..]);
    assert!(iter.next().unwrap().is_err());
}

#[test]
fn emit_pads_with_zeroes() {
    let tlv = DefaultTlv::new(9, vec![0xaa, 0xbb, 0xcc]);
    assert_eq!(tlv.buffer_len(), 8);
    let mut scratch = [0xffu8; 8];
    tlv.emit(&mut scratch);
    assert_eq!(scratch, [0x00, 0x09, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0x00]);
}

#[test]
fn default_tlv_round_trip() {
    let tlv = DefaultTlv::new(0x1234, vec![1, 2, 3, 4, 5]);
    let bytes = tlv_to_bytes(&tlv);
    let buf = TlvBuffer::new_checked(&bytes[..]).unwrap();
    assert_eq!(DefaultTlv::from(&buf), tlv);
}

#[test]
fn nested_records() {
    #[rustfmt::skip]
    let data = [
        // outer: type 33, length 12
        0x00, 0x21, 0x00, 0x0c,
        // inner: type 38, length 2, padded
        0x00, 0x26, 0x00, 0x02,
        0xde, 0xad, 0x00, 0x00,
        // inner: type 37, length 0
        0x00, 0x25, 0x00, 0x00,
    ];
    let outer = TlvBuffer::new_checked(&data[..]).unwrap();
    let inner: Vec<_> = outer.nested().collect::<Result<_, _>>().unwrap();
    assert_eq!(inner.len(), 2);
    assert_eq!(inner[0].kind(), 38);
    assert_eq!(inner[0].value(), &[0xde, 0xad]);
    assert_eq!(inner[1].kind(), 37);
}

#[test]
fn canonical_container_sorts_bytewise() {
    let a = tlv_to_bytes(&DefaultTlv::new(2, vec![0x01]));
    let b = tlv_to_bytes(&DefaultTlv::new(1, vec![0xff]));
    let c = tlv_to_bytes(&DefaultTlv::new(2, vec![0x00]));
    let container = canonical_container([a.clone(), b.clone(), c.clone()]);
    let mut expected = Vec::new();
    expected.extend_from_slice(&b);
    expected.extend_from_slice(&c);
    expected.extend_from_slice(&a);
    assert_eq!(container, expected);
    // Arrival order never matters.
    assert_eq!(canonical_container([c, a, b]), expected);
}
