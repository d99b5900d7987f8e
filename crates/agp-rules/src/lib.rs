//! AGP Rule Engine
//!
//! Decides, per connection attempt, whether a destination goes through
//! the proxy or bypasses it.
//!
//! Architecture:
//! 1. Config text → `RuleSet::compile` (each CIDR via `CidrRule::parse_v4/v6`)
//! 2. Candidate address text → `IpAddress::parse`
//! 3. `RuleSet::decide` → first matching rule, or the default action
//!
//! Everything here is pure and allocation-local; a compiled `RuleSet` is
//! shared across threads without locking.

mod addr;
mod cidr;
mod error;
mod routing;

pub use addr::{AddressFamily, IpAddress, Ipv4Address, Ipv6Address};
pub use cidr::{matches, CidrRule};
pub use error::{LiteralKind, ParseError};
pub use routing::{
    CompiledRule, Decision, PortRange, PriorityMode, Protocol, RouteAction, RoutingConfig,
    RuleConfig, RuleSet, Target, DEFAULT_PRIVATE_RULE, DEFAULT_PRIVATE_V4, DEFAULT_PRIVATE_V6,
};
