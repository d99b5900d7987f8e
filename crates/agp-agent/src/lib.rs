//! AGP Agent
//!
//! Glue between the host process and the rule engine: loads the
//! configuration, sets up logging, installs hooks on process attach and
//! answers "proxy or bypass?" for every intercepted connection.

pub mod agent;
pub mod config;
pub mod lifecycle;
pub mod logging;

pub use agent::{Agent, AgentMode, AgentStats, ProxyEndpoint, Route};
pub use config::{
    AgentConfig, ConfigError, ConfigFormat, LogConfig, ProxyConfig, ProxyKind, DEFAULT_CONFIG_FILE,
};
pub use lifecycle::{
    current_agent, default_config_path, on_process_attach, on_process_detach, version_proxy,
    HookError, HookInstaller, Runtime,
};
pub use logging::init_logging;

// Re-export the engine for hook dispatchers
pub use agp_bootstrap;
pub use agp_rules;
