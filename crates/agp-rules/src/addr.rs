//! Address Parser
//!
//! Parses textual IPv4 and IPv6 literals into fixed-width binary
//! addresses in network byte order.
//!
//! Accepted forms:
//! - IPv4: dotted decimal, exactly 4 groups, each 0-255, no leading zeros
//! - IPv6: up to 8 groups of 1-4 hex digits (any case), at most one `::`,
//!   optional dotted-decimal IPv4 as the final 32 bits
//!
//! Nothing here trims whitespace or accepts zone suffixes (`%eth0`).
//! Both parsers are pure functions of the input text.

use crate::error::{LiteralKind, ParseError};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

const IPV6_GROUPS: usize = 8;

/// IPv4 address: 4 octets, network byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Address([u8; 4]);

impl Ipv4Address {
    /// Create from individual octets
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0
    }

    /// Parse a dotted-decimal literal
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse_dotted(text)
            .map(Self)
            .map_err(|reason| ParseError::invalid(LiteralKind::Ipv4, text, reason))
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv4Addr::from(self.0), f)
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr.octets())
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        Ipv4Addr::from(addr.0)
    }
}

/// IPv6 address: exactly 16 octets, network byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv6Address([u8; 16]);

impl Ipv6Address {
    /// The all-zero address (`::`)
    pub const UNSPECIFIED: Self = Self([0; 16]);

    pub const fn from_octets(octets: [u8; 16]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0
    }

    /// Parse a textual IPv6 literal
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse_ipv6_octets(text)
            .map(Self)
            .map_err(|reason| ParseError::invalid(LiteralKind::Ipv6, text, reason))
    }
}

impl FromStr for Ipv6Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Ipv6Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Ipv6Addr::from(self.0), f)
    }
}

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Self(addr.octets())
    }
}

impl From<Ipv6Address> for Ipv6Addr {
    fn from(addr: Ipv6Address) -> Self {
        Ipv6Addr::from(addr.0)
    }
}

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Number of bits in an address of this family
    pub const fn bit_width(&self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// A parsed candidate address of either family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    /// Parse either family; text containing `:` is treated as IPv6
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text.contains(':') {
            Ipv6Address::parse(text).map(Self::V6)
        } else {
            Ipv4Address::parse(text).map(Self::V4)
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4(_) => AddressFamily::V4,
            Self::V6(_) => AddressFamily::V6,
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(addr) => fmt::Display::fmt(addr, f),
            Self::V6(addr) => fmt::Display::fmt(addr, f),
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        Self::V4(addr)
    }
}

impl From<Ipv6Address> for IpAddress {
    fn from(addr: Ipv6Address) -> Self {
        Self::V6(addr)
    }
}

impl From<std::net::IpAddr> for IpAddress {
    fn from(addr: std::net::IpAddr) -> Self {
        match addr {
            std::net::IpAddr::V4(v4) => Self::V4(v4.into()),
            std::net::IpAddr::V6(v6) => Self::V6(v6.into()),
        }
    }
}

/// Dotted decimal, exactly 4 groups
fn parse_dotted(text: &str) -> Result<[u8; 4], &'static str> {
    let mut octets = [0u8; 4];
    let mut count = 0;

    for group in text.split('.') {
        if count == octets.len() {
            return Err("expected exactly 4 groups");
        }
        octets[count] = parse_octet(group)?;
        count += 1;
    }

    if count != octets.len() {
        return Err("expected exactly 4 groups");
    }
    Ok(octets)
}

fn parse_octet(group: &str) -> Result<u8, &'static str> {
    if group.is_empty() {
        return Err("empty group");
    }
    if !group.bytes().all(|b| b.is_ascii_digit()) {
        return Err("non-digit character");
    }
    if group.len() > 1 && group.starts_with('0') {
        return Err("leading zero in group");
    }
    if group.len() > 3 {
        return Err("group out of range");
    }

    let value: u16 = group.parse().map_err(|_| "group out of range")?;
    u8::try_from(value).map_err(|_| "group out of range")
}

/// Fixed-capacity collector for 16-bit groups
#[derive(Default)]
struct Groups {
    words: [u16; IPV6_GROUPS],
    len: usize,
}

impl Groups {
    fn push(&mut self, word: u16) -> Result<(), &'static str> {
        if self.len == IPV6_GROUPS {
            return Err("more than 8 groups");
        }
        self.words[self.len] = word;
        self.len += 1;
        Ok(())
    }

    fn as_slice(&self) -> &[u16] {
        &self.words[..self.len]
    }
}

fn parse_hex_group(group: &str) -> Result<u16, &'static str> {
    if group.is_empty() {
        return Err("empty group");
    }
    if group.len() > 4 {
        return Err("group longer than 4 hex digits");
    }
    if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("invalid hex digit");
    }
    u16::from_str_radix(group, 16).map_err(|_| "invalid hex digit")
}

/// Parse one side of a `::` (or the whole address when uncompressed)
fn parse_section(section: &str, allow_ipv4_tail: bool) -> Result<Groups, &'static str> {
    let mut groups = Groups::default();
    if section.is_empty() {
        return Ok(groups);
    }

    let mut parts = section.split(':').peekable();
    while let Some(part) = parts.next() {
        let is_last = parts.peek().is_none();

        if part.contains('.') {
            if !(is_last && allow_ipv4_tail) {
                return Err("embedded IPv4 must be the final element");
            }
            let [a, b, c, d] = parse_dotted(part).map_err(|_| "invalid embedded IPv4 tail")?;
            groups.push(u16::from_be_bytes([a, b]))?;
            groups.push(u16::from_be_bytes([c, d]))?;
        } else {
            groups.push(parse_hex_group(part)?)?;
        }
    }

    Ok(groups)
}

fn parse_ipv6_octets(text: &str) -> Result<[u8; 16], &'static str> {
    if text.is_empty() {
        return Err("empty address");
    }

    let mut words = [0u16; IPV6_GROUPS];

    match text.find("::") {
        None => {
            let groups = parse_section(text, true)?;
            if groups.len != IPV6_GROUPS {
                return Err("expected 8 groups without '::'");
            }
            words.copy_from_slice(groups.as_slice());
        }
        Some(idx) => {
            let head = &text[..idx];
            let tail = &text[idx + 2..];
            if tail.contains("::") {
                return Err("more than one '::'");
            }

            let head = parse_section(head, false)?;
            let tail = parse_section(tail, true)?;

            // `::` has to stand for at least one zero group
            if head.len + tail.len >= IPV6_GROUPS {
                return Err("'::' must replace at least one group");
            }

            words[..head.len].copy_from_slice(head.as_slice());
            words[IPV6_GROUPS - tail.len..].copy_from_slice(tail.as_slice());
        }
    }

    let mut octets = [0u8; 16];
    for (chunk, word) in octets.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    Ok(octets)
}
