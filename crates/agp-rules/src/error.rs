//! Rule engine errors

use std::fmt;

/// What kind of literal failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Ipv4,
    Ipv6,
    CidrV4,
    CidrV6,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4 address"),
            Self::Ipv6 => write!(f, "IPv6 address"),
            Self::CidrV4 => write!(f, "IPv4 CIDR rule"),
            Self::CidrV6 => write!(f, "IPv6 CIDR rule"),
        }
    }
}

/// Errors produced while parsing addresses and rules
///
/// Parsing never yields a partial value: either the whole literal is valid
/// or this error comes back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid {kind} '{input}': {reason}")]
    InvalidFormat {
        kind: LiteralKind,
        input: String,
        reason: &'static str,
    },
}

impl ParseError {
    pub(crate) fn invalid(kind: LiteralKind, input: &str, reason: &'static str) -> Self {
        Self::InvalidFormat {
            kind,
            input: input.to_string(),
            reason,
        }
    }

    /// The literal kind that failed
    pub fn kind(&self) -> LiteralKind {
        match self {
            Self::InvalidFormat { kind, .. } => *kind,
        }
    }
}
