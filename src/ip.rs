// SPDX-License-Identifier: MIT

//! Bit-precise IPv6 prefix arithmetic.
//!
//! Delegated and assigned prefixes are carried on the wire as a bit count
//! plus `ceil(plen/8)` bytes, and IPv4 delegations travel inside the
//! IPv4-mapped IPv6 space, so everything here works on the full 128-bit
//! address with arbitrary prefix lengths.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use netlink_packet_utils::DecodeError;

pub(crate) const IPV6_ADDR_LEN: usize = 16;

/// Prefix length of the IPv4-mapped space `::ffff:0:0/96`. IPv4 delegated
/// prefixes are expressed inside it, e.g. `10.0.0.0/8` becomes
/// `::ffff:10.0.0.0/104`.
pub const IPV4_MAPPED_PLEN: u8 = 96;

pub(crate) fn parse_ipv6_addr(raw: &[u8]) -> Result<Ipv6Addr, DecodeError> {
    if raw.len() == IPV6_ADDR_LEN {
        let mut data = [0u8; IPV6_ADDR_LEN];
        data.copy_from_slice(raw);
        Ok(Ipv6Addr::from(data))
    } else {
        Err(DecodeError::from(format!(
            "Invalid u8 array length {}, expecting {IPV6_ADDR_LEN} \
            for IPv6 address, got {:?}",
            raw.len(),
            raw,
        )))
    }
}

pub(crate) fn bits_to_bytes(bits: u8) -> usize {
    (usize::from(bits) + 7) / 8
}

fn mask_tail(octets: &mut [u8; 16], plen: u8) {
    let plen = usize::from(plen);
    for (i, b) in octets.iter_mut().enumerate() {
        let bit = i * 8;
        if bit >= plen {
            *b = 0;
        } else if bit + 8 > plen {
            *b &= 0xffu8 << (8 - (plen - bit));
        }
    }
}

/// An IPv6 prefix: address plus prefix length in bits. Always stored in
/// canonical form (bits past `plen` are zero).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix {
    addr: Ipv6Addr,
    plen: u8,
}

impl Prefix {
    pub fn new(addr: Ipv6Addr, plen: u8) -> Self {
        debug_assert!(plen <= 128);
        let mut octets = addr.octets();
        mask_tail(&mut octets, plen);
        Prefix {
            addr: Ipv6Addr::from(octets),
            plen,
        }
    }

    /// Build from wire form: a bit count and at least `ceil(plen/8)`
    /// leading prefix bytes.
    pub fn from_wire(plen: u8, data: &[u8]) -> Result<Self, DecodeError> {
        if plen > 128 {
            return Err(DecodeError::from(format!(
                "invalid prefix length {plen}"
            )));
        }
        let n = bits_to_bytes(plen);
        if data.len() < n {
            return Err(DecodeError::from(format!(
                "prefix /{plen} needs {n} bytes, got {}",
                data.len()
            )));
        }
        let mut octets = [0u8; 16];
        octets[..n].copy_from_slice(&data[..n]);
        mask_tail(&mut octets, plen);
        Ok(Prefix {
            addr: Ipv6Addr::from(octets),
            plen,
        })
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn plen(&self) -> u8 {
        self.plen
    }

    /// Number of prefix bytes carried on the wire.
    pub fn wire_len(&self) -> usize {
        bits_to_bytes(self.plen)
    }

    pub fn emit_wire(&self, buffer: &mut [u8]) {
        let n = self.wire_len();
        buffer[..n].copy_from_slice(&self.addr.octets()[..n]);
    }

    fn bits_eq(a: &Ipv6Addr, b: &Ipv6Addr, plen: u8) -> bool {
        let ao = a.octets();
        let bo = b.octets();
        let full = usize::from(plen) / 8;
        if ao[..full] != bo[..full] {
            return false;
        }
        let rem = plen % 8;
        if rem == 0 {
            return true;
        }
        let mask = 0xffu8 << (8 - rem);
        (ao[full] & mask) == (bo[full] & mask)
    }

    /// True when `other` lies within `self` (equal prefixes included).
    pub fn contains(&self, other: &Prefix) -> bool {
        self.plen <= other.plen
            && Self::bits_eq(&self.addr, &other.addr, self.plen)
    }

    pub fn contains_addr(&self, addr: &Ipv6Addr) -> bool {
        Self::bits_eq(&self.addr, addr, self.plen)
    }

    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Extend this prefix to `plen` bits, filling the new bits from `bits`
    /// (taken from its most significant end).
    pub fn extend(&self, bits: &[u8], plen: u8) -> Self {
        debug_assert!(plen >= self.plen && plen <= 128);
        let mut octets = self.addr.octets();
        let mut src_bit = 0usize;
        for dst_bit in usize::from(self.plen)..usize::from(plen) {
            let bit = bits
                .get(src_bit / 8)
                .map(|b| (b >> (7 - (src_bit % 8))) & 1)
                .unwrap_or(0);
            if bit != 0 {
                octets[dst_bit / 8] |= 0x80 >> (dst_bit % 8);
            }
            src_bit += 1;
        }
        mask_tail(&mut octets, plen);
        Prefix {
            addr: Ipv6Addr::from(octets),
            plen,
        }
    }

    /// The address whose host bits (past `plen`) are all ones.
    pub fn highest_addr(&self) -> Ipv6Addr {
        let mut octets = self.addr.octets();
        let plen = usize::from(self.plen);
        for (i, b) in octets.iter_mut().enumerate() {
            let bit = i * 8;
            if bit >= plen {
                *b = 0xff;
            } else if bit + 8 > plen {
                *b |= 0xffu8 >> (plen - bit);
            }
        }
        Ipv6Addr::from(octets)
    }

    /// True when this prefix lies within the IPv4-mapped space.
    pub fn is_ipv4(&self) -> bool {
        self.plen >= IPV4_MAPPED_PLEN && ipv4_mapped_space().contains(self)
    }

    /// True for `fc00::/7` unique local prefixes.
    pub fn is_ula(&self) -> bool {
        self.plen >= 7 && (self.addr.octets()[0] & 0xfe) == 0xfc
    }

    /// True for globally routable `2000::/3` prefixes.
    pub fn is_global(&self) -> bool {
        self.plen >= 3 && (self.addr.octets()[0] & 0xe0) == 0x20
    }
}

/// `::ffff:0:0/96`.
pub fn ipv4_mapped_space() -> Prefix {
    Prefix::new(
        Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0),
        IPV4_MAPPED_PLEN,
    )
}

/// `fc00::/7`.
pub fn ula_space() -> Prefix {
    Prefix::new(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7)
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv4() {
            let o = self.addr.octets();
            let v4 = Ipv4Addr::new(o[12], o[13], o[14], o[15]);
            write!(f, "{}/{}", v4, self.plen - IPV4_MAPPED_PLEN)
        } else {
            write!(f, "{}/{}", self.addr, self.plen)
        }
    }
}

impl FromStr for Prefix {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, plen) = s
            .split_once('/')
            .ok_or_else(|| DecodeError::from(format!("not a prefix: {s}")))?;
        let plen: u8 = plen
            .parse()
            .map_err(|_| DecodeError::from(format!("bad prefix length in {s}")))?;
        if let Ok(v6) = addr.parse::<Ipv6Addr>() {
            if plen > 128 {
                return Err(DecodeError::from(format!(
                    "bad prefix length in {s}"
                )));
            }
            Ok(Prefix::new(v6, plen))
        } else if let Ok(v4) = addr.parse::<Ipv4Addr>() {
            if plen > 32 {
                return Err(DecodeError::from(format!(
                    "bad prefix length in {s}"
                )));
            }
            Ok(Prefix::new(v4.to_ipv6_mapped(), plen + IPV4_MAPPED_PLEN))
        } else {
            Err(DecodeError::from(format!("not a prefix: {s}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn canonical_form_masks_tail() {
        let pfx = Prefix::new("2001:db8::ffff".parse().unwrap(), 64);
        assert_eq!(pfx, p("2001:db8::/64"));
    }

    #[test]
    fn containment() {
        assert!(p("2001:db8::/56").contains(&p("2001:db8:0:10::/64")));
        assert!(!p("2001:db8::/56").contains(&p("2001:db9::/64")));
        assert!(!p("2001:db8::/64").contains(&p("2001:db8::/56")));
        assert!(p("2001:db8::/56").overlaps(&p("2001:db8::/48")));
    }

    #[test]
    fn wire_round_trip_uses_partial_bytes() {
        let pfx = p("2001:db8:80::/41");
        assert_eq!(pfx.wire_len(), 6);
        let mut buf = [0u8; 6];
        pfx.emit_wire(&mut buf);
        assert_eq!(buf, [0x20, 0x01, 0x0d, 0xb8, 0x00, 0x80]);
        assert_eq!(Prefix::from_wire(41, &buf).unwrap(), pfx);
    }

    #[test]
    fn ipv4_mapped_form() {
        let pfx = p("10.0.0.0/8");
        assert_eq!(pfx.plen(), 104);
        assert!(pfx.is_ipv4());
        assert_eq!(pfx.to_string(), "10.0.0.0/8");
        // Load-bearing byte layout: ::ffff:10.0.0.0/104.
        assert_eq!(
            pfx.addr().octets(),
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 10, 0, 0, 0]
        );
    }

    #[test]
    fn classify() {
        assert!(p("fd00:1234::/48").is_ula());
        assert!(!p("2001:db8::/56").is_ula());
        assert!(p("2001:db8::/56").is_global());
        assert!(!p("10.0.0.0/8").is_global());
    }

    #[test]
    fn extend_places_bits_after_prefix() {
        let dp = p("2001:db8::/56");
        let sub = dp.extend(&[0x42], 64);
        assert_eq!(sub, p("2001:db8:0:42::/64"));
    }

    #[test]
    fn highest_addr_sets_host_bits() {
        let pfx = p("2001:db8:0:10::/64");
        assert_eq!(
            pfx.highest_addr(),
            "2001:db8:0:10:ffff:ffff:ffff:ffff"
                .parse::<Ipv6Addr>()
                .unwrap()
        );
    }
}
