//! CIDR Rule Matcher
//!
//! Parses `<address>/<prefix-length>` rules and tests candidate
//! addresses against them.
//!
//! Matching compares the leading `prefix-length` bits, most significant
//! bit first. Host bits of the rule's base address are ignored, so
//! `10.1.2.3/8` behaves exactly like `10.0.0.0/8`.

use crate::addr::{AddressFamily, IpAddress, Ipv4Address, Ipv6Address};
use crate::error::{LiteralKind, ParseError};
use std::fmt;
use std::str::FromStr;

/// A single CIDR prefix of either family
///
/// Only built through the checked constructors, so `prefix_len` never
/// exceeds the family's bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrRule(Prefix);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Prefix {
    V4 { base: Ipv4Address, prefix_len: u8 },
    V6 { base: Ipv6Address, prefix_len: u8 },
}

impl CidrRule {
    /// Build an IPv4 rule, checking the prefix range
    pub fn v4(base: Ipv4Address, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > AddressFamily::V4.bit_width() {
            return Err(ParseError::invalid(
                LiteralKind::CidrV4,
                &format!("{}/{}", base, prefix_len),
                "prefix length out of range",
            ));
        }
        Ok(Self(Prefix::V4 { base, prefix_len }))
    }

    /// Build an IPv6 rule, checking the prefix range
    pub fn v6(base: Ipv6Address, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > AddressFamily::V6.bit_width() {
            return Err(ParseError::invalid(
                LiteralKind::CidrV6,
                &format!("{}/{}", base, prefix_len),
                "prefix length out of range",
            ));
        }
        Ok(Self(Prefix::V6 { base, prefix_len }))
    }

    /// Parse an IPv4 rule such as `10.0.0.0/8`
    pub fn parse_v4(text: &str) -> Result<Self, ParseError> {
        let invalid = |reason| ParseError::invalid(LiteralKind::CidrV4, text, reason);

        let (addr, prefix) = split_rule(text).map_err(invalid)?;
        let base = Ipv4Address::parse(addr).map_err(|_| invalid("invalid address part"))?;
        let prefix_len = parse_prefix_len(prefix, AddressFamily::V4).map_err(invalid)?;

        Ok(Self(Prefix::V4 { base, prefix_len }))
    }

    /// Parse an IPv6 rule such as `fc00::/7`
    pub fn parse_v6(text: &str) -> Result<Self, ParseError> {
        let invalid = |reason| ParseError::invalid(LiteralKind::CidrV6, text, reason);

        let (addr, prefix) = split_rule(text).map_err(invalid)?;
        let base = Ipv6Address::parse(addr).map_err(|_| invalid("invalid address part"))?;
        let prefix_len = parse_prefix_len(prefix, AddressFamily::V6).map_err(invalid)?;

        Ok(Self(Prefix::V6 { base, prefix_len }))
    }

    /// Parse a rule of either family; text containing `:` is IPv6
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text.contains(':') {
            Self::parse_v6(text)
        } else {
            Self::parse_v4(text)
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self.0 {
            Prefix::V4 { .. } => AddressFamily::V4,
            Prefix::V6 { .. } => AddressFamily::V6,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        match self.0 {
            Prefix::V4 { prefix_len, .. } | Prefix::V6 { prefix_len, .. } => prefix_len,
        }
    }

    /// Base address exactly as written in the rule
    pub fn base(&self) -> IpAddress {
        match self.0 {
            Prefix::V4 { base, .. } => IpAddress::V4(base),
            Prefix::V6 { base, .. } => IpAddress::V6(base),
        }
    }

    /// Base address with the host bits cleared
    pub fn network(&self) -> IpAddress {
        match self.0 {
            Prefix::V4 { base, prefix_len } => {
                let mut octets = base.octets();
                clear_host_bits(&mut octets, prefix_len);
                IpAddress::V4(Ipv4Address::from_octets(octets))
            }
            Prefix::V6 { base, prefix_len } => {
                let mut octets = base.octets();
                clear_host_bits(&mut octets, prefix_len);
                IpAddress::V6(Ipv6Address::from_octets(octets))
            }
        }
    }

    /// Check whether `address` falls inside this prefix
    ///
    /// An address of the other family never matches.
    #[inline]
    pub fn matches(&self, address: &IpAddress) -> bool {
        match (self.0, address) {
            (Prefix::V4 { base, prefix_len }, IpAddress::V4(addr)) => {
                prefix_matches(&addr.octets(), &base.octets(), prefix_len)
            }
            (Prefix::V6 { base, prefix_len }, IpAddress::V6(addr)) => {
                prefix_matches(&addr.octets(), &base.octets(), prefix_len)
            }
            _ => false,
        }
    }
}

impl FromStr for CidrRule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CidrRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Prefix::V4 { base, prefix_len } => write!(f, "{}/{}", base, prefix_len),
            Prefix::V6 { base, prefix_len } => write!(f, "{}/{}", base, prefix_len),
        }
    }
}

/// Free-function form of [`CidrRule::matches`]
#[inline]
pub fn matches(address: &IpAddress, rule: &CidrRule) -> bool {
    rule.matches(address)
}

fn split_rule(text: &str) -> Result<(&str, &str), &'static str> {
    text.split_once('/').ok_or("missing '/prefix-length'")
}

fn parse_prefix_len(text: &str, family: AddressFamily) -> Result<u8, &'static str> {
    if text.is_empty() {
        return Err("empty prefix length");
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err("prefix length is not a decimal number");
    }
    if text.len() > 1 && text.starts_with('0') {
        return Err("leading zero in prefix length");
    }
    if text.len() > 3 {
        return Err("prefix length out of range");
    }

    let value: u16 = text.parse().map_err(|_| "prefix length out of range")?;
    if value > u16::from(family.bit_width()) {
        return Err("prefix length out of range");
    }
    Ok(value as u8)
}

/// Compare the leading `prefix_len` bits of two equal-width addresses
fn prefix_matches(addr: &[u8], base: &[u8], prefix_len: u8) -> bool {
    let full_bytes = usize::from(prefix_len / 8);
    let rem_bits = prefix_len % 8;

    if addr[..full_bytes] != base[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }

    let mask = 0xFFu8 << (8 - rem_bits);
    (addr[full_bytes] & mask) == (base[full_bytes] & mask)
}

fn clear_host_bits(octets: &mut [u8], prefix_len: u8) {
    let full_bytes = usize::from(prefix_len / 8);
    let rem_bits = prefix_len % 8;

    let mut rest = full_bytes;
    if rem_bits != 0 {
        octets[full_bytes] &= 0xFFu8 << (8 - rem_bits);
        rest += 1;
    }
    for byte in &mut octets[rest..] {
        *byte = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_v6(ip: &str, cidr: &str) -> bool {
        let rule = CidrRule::parse_v6(cidr).unwrap();
        let addr = IpAddress::parse(ip).unwrap();
        matches(&addr, &rule)
    }

    fn match_v4(ip: &str, cidr: &str) -> bool {
        let rule = CidrRule::parse_v4(cidr).unwrap();
        let addr = IpAddress::parse(ip).unwrap();
        matches(&addr, &rule)
    }

    #[test]
    fn test_parse_v4_rule() {
        let rule = CidrRule::parse_v4("192.168.0.0/16").unwrap();
        assert_eq!(rule.family(), AddressFamily::V4);
        assert_eq!(rule.prefix_len(), 16);
        assert_eq!(rule.to_string(), "192.168.0.0/16");
    }

    #[test]
    fn test_parse_v6_rule() {
        let rule = CidrRule::parse_v6("FC00::/7").unwrap();
        assert_eq!(rule.family(), AddressFamily::V6);
        assert_eq!(rule.prefix_len(), 7);
        assert_eq!(rule, CidrRule::parse_v6("fc00::/7").unwrap());
    }

    #[test]
    fn test_prefix_range_bounds() {
        assert!(CidrRule::parse_v4("0.0.0.0/0").is_ok());
        assert!(CidrRule::parse_v4("1.2.3.4/32").is_ok());
        assert!(CidrRule::parse_v4("1.2.3.4/33").is_err());
        assert!(CidrRule::parse_v6("::/0").is_ok());
        assert!(CidrRule::parse_v6("::1/128").is_ok());
        assert!(CidrRule::parse_v6("::1/129").is_err());
        assert!(CidrRule::v4(Ipv4Address::new(1, 2, 3, 4), 33).is_err());
        assert!(CidrRule::v6(Ipv6Address::UNSPECIFIED, 128).is_ok());
    }

    #[test]
    fn test_checked_constructors_never_overflow() {
        let base = Ipv4Address::new(10, 0, 0, 0);
        assert!(CidrRule::v4(base, 40).is_err());
        assert!(CidrRule::v6(Ipv6Address::UNSPECIFIED, 129).is_err());

        let addr = IpAddress::V4(Ipv4Address::new(10, 0, 0, 1));
        let full = CidrRule::v4(base, 32).unwrap();
        assert!(!full.matches(&addr));
        assert!(CidrRule::v4(base, 31).unwrap().matches(&addr));
        assert_eq!(full.prefix_len(), 32);
    }

    #[test]
    fn test_rejects_malformed_rules() {
        for bad in [
            "10.0.0.0", "10.0.0.0/", "10.0.0.0/+8", "10.0.0.0/-1", "10.0.0.0/8a", "10.0.0.0/08",
            "10.0.0.0/8/8", "10.0.0/8", "/8", "10.0.0.0 /8", "10.0.0.0/ 8", "10.0.0.0/0008",
        ] {
            let err = CidrRule::parse_v4(bad).unwrap_err();
            assert_eq!(err.kind(), LiteralKind::CidrV4, "input {:?}", bad);
        }
        for bad in ["fc00::", "fc00::/", "gggg::/16", "2001:::1/64", "::/1000", "::/abc"] {
            let err = CidrRule::parse_v6(bad).unwrap_err();
            assert_eq!(err.kind(), LiteralKind::CidrV6, "input {:?}", bad);
        }
    }

    #[test]
    fn test_bare_address_is_not_a_rule() {
        assert!(CidrRule::parse("10.0.0.1").is_err());
        assert!(CidrRule::parse("::1").is_err());
    }

    #[test]
    fn test_family_specific_parsers() {
        assert!(CidrRule::parse_v4("fc00::/7").is_err());
        assert!(CidrRule::parse_v6("10.0.0.0/8").is_err());
        assert_eq!(CidrRule::parse("fc00::/7").unwrap().family(), AddressFamily::V6);
        assert_eq!(CidrRule::parse("10.0.0.0/8").unwrap().family(), AddressFamily::V4);
    }

    #[test]
    fn test_unique_local_seven_bit_boundary() {
        assert!(match_v6("fc00::1", "fc00::/7"));
        assert!(match_v6("fd00::1", "fc00::/7"));
        assert!(!match_v6("fe00::1", "fc00::/7"));
    }

    #[test]
    fn test_link_local_ten_bit_boundary() {
        assert!(match_v6("fe80::1", "fe80::/10"));
        assert!(match_v6("febf:ffff::1", "fe80::/10"));
        assert!(!match_v6("fec0::1", "fe80::/10"));
    }

    #[test]
    fn test_full_width_requires_exact_match() {
        assert!(match_v6("::1", "::1/128"));
        assert!(!match_v6("::2", "::1/128"));
        assert!(match_v6("2001:db8::1", "2001:db8::1/128"));
        assert!(match_v4("10.0.0.1", "10.0.0.1/32"));
        assert!(!match_v4("10.0.0.2", "10.0.0.1/32"));
    }

    #[test]
    fn test_zero_prefix_matches_whole_family() {
        for ip in ["::", "::1", "fe80::1", "1234:5678:9abc:def0:1111:2222:3333:4444", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"] {
            assert!(match_v6(ip, "::/0"), "{}", ip);
        }
        for ip in ["0.0.0.0", "8.8.8.8", "255.255.255.255"] {
            assert!(match_v4(ip, "0.0.0.0/0"), "{}", ip);
        }
    }

    #[test]
    fn test_private_v4_ranges() {
        assert!(match_v4("10.200.3.4", "10.0.0.0/8"));
        assert!(!match_v4("11.0.0.1", "10.0.0.0/8"));
        assert!(match_v4("172.31.255.255", "172.16.0.0/12"));
        assert!(!match_v4("172.32.0.0", "172.16.0.0/12"));
        assert!(match_v4("192.168.50.1", "192.168.0.0/16"));
        assert!(!match_v4("192.169.0.1", "192.168.0.0/16"));
    }

    #[test]
    fn test_host_bits_in_rule_are_ignored() {
        assert!(match_v4("10.9.9.9", "10.1.2.3/8"));
        assert!(match_v6("fd12::1", "fdff:1:2::3/8"));

        let rule = CidrRule::parse_v4("10.1.2.3/8").unwrap();
        assert_eq!(rule.network().to_string(), "10.0.0.0");
        assert_eq!(rule.base().to_string(), "10.1.2.3");

        let rule = CidrRule::parse_v6("fe80::1234/10").unwrap();
        assert_eq!(rule.network().to_string(), "fe80::");
    }

    #[test]
    fn test_cross_family_never_matches() {
        let v4_all = CidrRule::parse_v4("0.0.0.0/0").unwrap();
        let v6_all = CidrRule::parse_v6("::/0").unwrap();
        let v4 = IpAddress::parse("10.0.0.1").unwrap();
        let v6 = IpAddress::parse("::ffff:10.0.0.1").unwrap();

        assert!(!v4_all.matches(&v6));
        assert!(!v6_all.matches(&v4));
        assert!(v4_all.matches(&v4));
        assert!(v6_all.matches(&v6));
    }

    #[test]
    fn test_v4_mapped_rule() {
        assert!(match_v6("::ffff:192.0.2.128", "::ffff:192.0.2.0/120"));
        assert!(!match_v6("::ffff:192.0.3.1", "::ffff:192.0.2.0/120"));
    }
}
