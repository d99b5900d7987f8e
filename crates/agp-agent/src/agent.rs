//! Agent
//!
//! Per-connection routing decisions for the hook dispatcher. An agent is
//! either ACTIVE (rules compiled, hooks installed) or in BYPASS mode, where
//! every connection passes through untouched.

use crate::config::{AgentConfig, ProxyConfig, ProxyKind};
use agp_rules::{Protocol, RouteAction, RuleSet, Target};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Agent operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Rules are evaluated for every connection
    Active,
    /// No interception; everything is passed through
    Bypass,
}

impl AgentMode {
    pub fn is_bypass(&self) -> bool {
        matches!(self, AgentMode::Bypass)
    }
}

/// Where proxied connections are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
}

impl From<&ProxyConfig> for ProxyEndpoint {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            kind: config.kind,
            host: config.host.trim().to_string(),
            port: config.port,
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.kind, self.host, self.port)
    }
}

/// Routing outcome for one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Connect directly
    Bypass,
    /// Connect through this proxy
    Proxy(&'a ProxyEndpoint),
}

impl Route<'_> {
    pub fn is_bypass(&self) -> bool {
        matches!(self, Route::Bypass)
    }
}

/// Decision counters
#[derive(Debug, Default)]
pub struct AgentStats {
    pub decisions: AtomicU64,
    pub proxied: AtomicU64,
    pub bypassed: AtomicU64,
}

impl AgentStats {
    /// `(decisions, proxied, bypassed)`
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.decisions.load(Ordering::Relaxed),
            self.proxied.load(Ordering::Relaxed),
            self.bypassed.load(Ordering::Relaxed),
        )
    }
}

/// Shared agent state, handed to the hook installer as `Arc<Agent>`
#[derive(Debug)]
pub struct Agent {
    mode: AgentMode,
    rules: RuleSet,
    proxy: ProxyEndpoint,
    stats: AgentStats,
}

impl Agent {
    /// Active agent from a loaded configuration
    pub fn new(config: &AgentConfig) -> Self {
        let agent = Self {
            mode: AgentMode::Active,
            rules: RuleSet::compile(&config.routing),
            proxy: ProxyEndpoint::from(&config.proxy),
            stats: AgentStats::default(),
        };

        info!(
            "Agent active: {} rules, default {}, proxy {}",
            agent.rules.len(),
            agent.rules.default_action(),
            agent.proxy
        );
        agent
    }

    /// Agent that passes everything through
    pub fn bypass() -> Self {
        Self {
            mode: AgentMode::Bypass,
            rules: RuleSet::empty(RouteAction::Direct),
            proxy: ProxyEndpoint::from(&ProxyConfig::default()),
            stats: AgentStats::default(),
        }
    }

    /// Decide how to route a connection to a textual address
    ///
    /// Text that is not an IP literal gets the default action.
    pub fn route(&self, addr: &str, port: u16, protocol: Protocol) -> Route<'_> {
        if self.mode.is_bypass() {
            return self.record(RouteAction::Direct);
        }

        let decision = self.rules.decide_literal(addr, port, protocol);
        debug!(
            "{} {}:{} -> {} ({})",
            protocol,
            addr,
            port,
            decision.action,
            decision.rule.as_deref().unwrap_or("default")
        );
        self.record(decision.action)
    }

    /// Decide how to route an already-parsed target
    pub fn route_target(&self, target: &Target) -> Route<'_> {
        if self.mode.is_bypass() {
            return self.record(RouteAction::Direct);
        }
        let decision = self.rules.decide(target);
        self.record(decision.action)
    }

    fn record(&self, action: RouteAction) -> Route<'_> {
        self.stats.decisions.fetch_add(1, Ordering::Relaxed);
        if action.is_bypass() {
            self.stats.bypassed.fetch_add(1, Ordering::Relaxed);
            Route::Bypass
        } else {
            self.stats.proxied.fetch_add(1, Ordering::Relaxed);
            Route::Proxy(&self.proxy)
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn proxy(&self) -> &ProxyEndpoint {
        &self.proxy
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }
}
