//! Routing Rules
//!
//! Compiles the `routing` section of the agent configuration into an
//! ordered rule set and evaluates connection targets against it.
//!
//! Rule evaluation:
//! 1. Rules are tried in order (config order, or descending `priority`)
//! 2. A rule matches when protocol, port and address all match; an empty
//!    protocol or port list accepts anything, the address must hit a CIDR
//! 3. First match wins; otherwise `default_action` applies
//!
//! A malformed CIDR or port entry is dropped with a warning. A rule left
//! without a usable CIDR can never match an IP target and is dropped, as
//! is a rule that loses every entry of its port list.

use crate::addr::IpAddress;
use crate::cidr::CidrRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, trace, warn};

/// What to do with a matched connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    /// Send through the configured proxy
    Proxy,
    /// Pass through unmodified (bypass)
    Direct,
}

impl RouteAction {
    pub fn is_bypass(&self) -> bool {
        matches!(self, RouteAction::Direct)
    }
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy => write!(f, "proxy"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// How rule order is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    /// Top to bottom as listed
    #[default]
    Order,
    /// Higher `priority` first; ties keep list order
    Number,
}

/// Transport protocol of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// One rule as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_action")]
    pub action: RouteAction,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub ip_cidrs_v4: Vec<String>,
    #[serde(default)]
    pub ip_cidrs_v6: Vec<String>,
    /// Hostname patterns; kept for config compatibility, never matched
    #[serde(default)]
    pub domains: Vec<String>,
    /// `"443"` or `"8000-8100"`
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<Protocol>,
}

impl RuleConfig {
    /// New enabled rule with proxy action and no match lists
    pub fn new(name: impl Into<String>, action: RouteAction) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            action,
            priority: 0,
            ip_cidrs_v4: Vec::new(),
            ip_cidrs_v6: Vec::new(),
            domains: Vec::new(),
            ports: Vec::new(),
            protocols: default_protocols(),
        }
    }
}

/// The `routing` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority_mode: PriorityMode,
    #[serde(default = "default_action")]
    pub default_action: RouteAction,
    /// Prepend the built-in private/loopback direct rule
    #[serde(default = "default_true")]
    pub use_default_private: bool,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority_mode: PriorityMode::Order,
            default_action: RouteAction::Proxy,
            use_default_private: true,
            rules: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_action() -> RouteAction {
    RouteAction::Proxy
}

fn default_protocols() -> Vec<Protocol> {
    vec![Protocol::Tcp]
}

/// Name of the built-in private network rule
pub const DEFAULT_PRIVATE_RULE: &str = "default-private";

/// Private, loopback and link-local ranges that never go through the proxy
pub const DEFAULT_PRIVATE_V4: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "169.254.0.0/16",
];

pub const DEFAULT_PRIVATE_V6: &[&str] = &["fc00::/7", "fe80::/10", "::1/128"];

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Parse `"443"` or `"8000-8100"`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (start, end) = match text.split_once('-') {
            Some((start, end)) => (parse_port(start)?, parse_port(end)?),
            None => {
                let port = parse_port(text)?;
                (port, port)
            }
        };
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

fn parse_port(text: &str) -> Option<u16> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// A connection attempt to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub addr: IpAddress,
    pub port: u16,
    pub protocol: Protocol,
}

impl Target {
    pub fn new(addr: IpAddress, port: u16, protocol: Protocol) -> Self {
        Self { addr, port, protocol }
    }

    pub fn tcp(addr: IpAddress, port: u16) -> Self {
        Self::new(addr, port, Protocol::Tcp)
    }
}

/// Result of evaluating a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: RouteAction,
    /// Name of the rule that matched, `None` for the default action
    pub rule: Option<String>,
}

impl Decision {
    fn default_for(action: RouteAction) -> Self {
        Self { action, rule: None }
    }

    pub fn is_bypass(&self) -> bool {
        self.action.is_bypass()
    }
}

/// A validated rule ready for matching
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub action: RouteAction,
    pub priority: i32,
    pub cidrs: Vec<CidrRule>,
    pub ports: Vec<PortRange>,
    pub protocols: Vec<Protocol>,
}

impl CompiledRule {
    /// Compile one rule; `None` when the rule has to be dropped
    fn compile(config: &RuleConfig) -> Option<Self> {
        let declared_cidrs = config.ip_cidrs_v4.len() + config.ip_cidrs_v6.len();

        let mut cidrs = Vec::with_capacity(declared_cidrs);
        for text in &config.ip_cidrs_v4 {
            match CidrRule::parse_v4(text.trim()) {
                Ok(rule) => cidrs.push(rule),
                Err(e) => warn!("Rule '{}': skipping {}", config.name, e),
            }
        }
        for text in &config.ip_cidrs_v6 {
            match CidrRule::parse_v6(text.trim()) {
                Ok(rule) => cidrs.push(rule),
                Err(e) => warn!("Rule '{}': skipping {}", config.name, e),
            }
        }

        if cidrs.is_empty() {
            if declared_cidrs > 0 {
                warn!("Rule '{}' dropped: none of its CIDRs are valid", config.name);
            } else {
                debug!("Rule '{}' dropped: no IP CIDRs to match", config.name);
            }
            return None;
        }

        let mut ports = Vec::with_capacity(config.ports.len());
        for text in &config.ports {
            match PortRange::parse(text) {
                Some(range) => ports.push(range),
                None => warn!("Rule '{}': skipping invalid port '{}'", config.name, text),
            }
        }

        if !config.ports.is_empty() && ports.is_empty() {
            warn!("Rule '{}' dropped: none of its ports are valid", config.name);
            return None;
        }

        if !config.domains.is_empty() {
            debug!(
                "Rule '{}': ignoring {} domain patterns",
                config.name,
                config.domains.len()
            );
        }

        Some(Self {
            name: config.name.clone(),
            action: config.action,
            priority: config.priority,
            cidrs,
            ports,
            protocols: config.protocols.clone(),
        })
    }

    /// The built-in private network rule
    fn default_private() -> Self {
        let cidrs = DEFAULT_PRIVATE_V4
            .iter()
            .filter_map(|text| CidrRule::parse_v4(text).ok())
            .chain(
                DEFAULT_PRIVATE_V6
                    .iter()
                    .filter_map(|text| CidrRule::parse_v6(text).ok()),
            )
            .collect();

        Self {
            name: DEFAULT_PRIVATE_RULE.to_string(),
            action: RouteAction::Direct,
            priority: i32::MAX,
            cidrs,
            ports: Vec::new(),
            protocols: vec![Protocol::Tcp],
        }
    }

    /// Check if this rule matches a target
    pub fn matches(&self, target: &Target) -> bool {
        if !self.protocols.is_empty() && !self.protocols.contains(&target.protocol) {
            return false;
        }
        if !self.ports.is_empty() && !self.ports.iter().any(|r| r.contains(target.port)) {
            return false;
        }
        self.cidrs.iter().any(|cidr| cidr.matches(&target.addr))
    }
}

/// Ordered, immutable set of compiled rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    enabled: bool,
    default_action: RouteAction,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile a routing configuration; never fails
    pub fn compile(config: &RoutingConfig) -> Self {
        let mut rules = Vec::with_capacity(config.rules.len() + 1);

        if config.use_default_private {
            rules.push(CompiledRule::default_private());
        }

        let mut disabled = 0;
        let mut dropped = 0;
        for rule in &config.rules {
            if !rule.enabled {
                disabled += 1;
                continue;
            }
            match CompiledRule::compile(rule) {
                Some(compiled) => rules.push(compiled),
                None => dropped += 1,
            }
        }

        if config.priority_mode == PriorityMode::Number {
            // stable: equal priorities keep list order
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        info!(
            "Compiled routing rules: {} active, {} disabled, {} dropped (mode: {:?}, default: {})",
            rules.len(),
            disabled,
            dropped,
            config.priority_mode,
            config.default_action
        );

        Self {
            enabled: config.enabled,
            default_action: config.default_action,
            rules,
        }
    }

    /// Rule set that sends everything to `default_action`
    pub fn empty(default_action: RouteAction) -> Self {
        Self {
            enabled: true,
            default_action,
            rules: Vec::new(),
        }
    }

    /// Evaluate a target: first matching rule wins
    pub fn decide(&self, target: &Target) -> Decision {
        if !self.enabled {
            return Decision::default_for(self.default_action);
        }

        match self.rules.iter().find(|rule| rule.matches(target)) {
            Some(rule) => {
                trace!("{}:{} matched rule '{}' -> {}", target.addr, target.port, rule.name, rule.action);
                Decision {
                    action: rule.action,
                    rule: Some(rule.name.clone()),
                }
            }
            None => Decision::default_for(self.default_action),
        }
    }

    /// Evaluate a textual address; unparsable text gets the default action
    pub fn decide_literal(&self, addr: &str, port: u16, protocol: Protocol) -> Decision {
        match IpAddress::parse(addr) {
            Ok(addr) => self.decide(&Target::new(addr, port, protocol)),
            Err(e) => {
                debug!("Not an IP literal, using default action: {}", e);
                Decision::default_for(self.default_action)
            }
        }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn default_action(&self) -> RouteAction {
        self.default_action
    }
}
