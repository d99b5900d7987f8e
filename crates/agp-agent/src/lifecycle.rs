//! Agent lifecycle
//!
//! Process attach runs under the OS loader lock, so it only reads the
//! config and installs hooks. The real `version.dll` is not touched here;
//! `Bootstrap::api()` loads it on the first forwarded call instead.
//!
//! # Behavior
//!
//! - Config missing or invalid: BYPASS mode, no hooks
//! - Hook installation fails: BYPASS mode
//! - Otherwise: ACTIVE, hooks route through the shared `Arc<Agent>`
//!
//! Detach removes the hooks, then releases the real library.

use crate::agent::{Agent, AgentMode};
use crate::config::{AgentConfig, LogConfig, DEFAULT_CONFIG_FILE};
use crate::logging::init_logging;
use agp_bootstrap::{Bootstrap, LibraryLoader, SystemLoader, VERSION_DLL};
use anyhow::Context;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// The process-wide `version.dll` bootstrap; building it loads nothing
static VERSION_PROXY: Lazy<Bootstrap<SystemLoader>> =
    Lazy::new(|| Bootstrap::new(SystemLoader::new(VERSION_DLL)));

/// The runtime created by `on_process_attach`
static RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);

/// Bootstrap used by every forwarded export
pub fn version_proxy() -> &'static Bootstrap<SystemLoader> {
    &VERSION_PROXY
}

/// Config file expected next to the injected library
pub fn default_config_path(module_dir: &Path) -> PathBuf {
    module_dir.join(DEFAULT_CONFIG_FILE)
}

/// Installs the interception hooks into the host's networking calls
pub trait HookInstaller: Send {
    /// Route intercepted connections through `agent`
    fn install(&mut self, agent: Arc<Agent>) -> Result<(), HookError>;

    /// Restore the original functions
    fn uninstall(&mut self) -> Result<(), HookError>;
}

/// Hook installation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    #[error("Failed to install hooks: {0}")]
    Install(String),

    #[error("Failed to remove hooks: {0}")]
    Uninstall(String),
}

/// Agent state between process attach and detach
pub struct Runtime<L: LibraryLoader + 'static = SystemLoader> {
    agent: Arc<Agent>,
    /// `Some` only while hooks are installed
    installer: Option<Box<dyn HookInstaller>>,
    bootstrap: &'static Bootstrap<L>,
}

impl Runtime {
    /// Attach using the process-wide bootstrap
    pub fn attach(config_path: &Path, installer: Box<dyn HookInstaller>) -> Self {
        Self::attach_with(config_path, installer, version_proxy())
    }
}

impl<L: LibraryLoader + 'static> Runtime<L> {
    /// Attach with an explicit bootstrap; never fails, falls back to BYPASS
    pub fn attach_with(
        config_path: &Path,
        mut installer: Box<dyn HookInstaller>,
        bootstrap: &'static Bootstrap<L>,
    ) -> Self {
        let config = match AgentConfig::load(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))
        {
            Ok(config) => config,
            Err(e) => {
                init_logging(&LogConfig::default());
                error!("{:#}", e);
                warn!("Entering BYPASS mode, no hooks installed");
                return Self::bypass(bootstrap);
            }
        };

        init_logging(&config.log);

        let agent = Arc::new(Agent::new(&config));
        if let Err(e) = installer
            .install(Arc::clone(&agent))
            .context("installing network hooks")
        {
            error!("{:#}", e);
            warn!("Entering BYPASS mode");
            return Self::bypass(bootstrap);
        }

        info!("Agent attached, hooks installed");
        Self {
            agent,
            installer: Some(installer),
            bootstrap,
        }
    }

    fn bypass(bootstrap: &'static Bootstrap<L>) -> Self {
        Self {
            agent: Arc::new(Agent::bypass()),
            installer: None,
            bootstrap,
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn mode(&self) -> AgentMode {
        self.agent.mode()
    }

    pub fn hooks_installed(&self) -> bool {
        self.installer.is_some()
    }

    /// Remove hooks (if any); the real library stays loaded
    pub fn remove_hooks(&mut self) {
        if let Some(mut installer) = self.installer.take() {
            match installer.uninstall() {
                Ok(()) => debug!("Hooks removed"),
                Err(e) => warn!("{}", e),
            }
        }
    }

    /// Remove hooks (if any), then release the real library
    pub fn detach(mut self) {
        self.remove_hooks();
        self.bootstrap.teardown();

        let (decisions, proxied, bypassed) = self.agent.stats().snapshot();
        info!(
            "Agent detached ({} decisions: {} proxied, {} bypassed)",
            decisions, proxied, bypassed
        );
    }
}

/// Process attach entry point
///
/// Safe to call under the loader lock: reads the config, installs hooks,
/// and never loads the real library.
pub fn on_process_attach(config_path: &Path, installer: Box<dyn HookInstaller>) -> AgentMode {
    attach_into(&RUNTIME, config_path, installer, version_proxy())
}

/// Attach into `slot`, first unhooking any runtime already there
fn attach_into<L: LibraryLoader + 'static>(
    slot: &Mutex<Option<Runtime<L>>>,
    config_path: &Path,
    installer: Box<dyn HookInstaller>,
    bootstrap: &'static Bootstrap<L>,
) -> AgentMode {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(mut previous) = slot.take() {
        warn!("Process attach ran twice, removing previous hooks");
        previous.remove_hooks();
    }

    let runtime = Runtime::attach_with(config_path, installer, bootstrap);
    let mode = runtime.mode();
    *slot = Some(runtime);
    mode
}

/// Process detach entry point
pub fn on_process_detach() {
    let runtime = RUNTIME.lock().unwrap_or_else(PoisonError::into_inner).take();
    match runtime {
        Some(runtime) => runtime.detach(),
        None => version_proxy().teardown(),
    }
}

/// The attached agent, if any
pub fn current_agent() -> Option<Arc<Agent>> {
    RUNTIME
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(|runtime| Arc::clone(runtime.agent()))
}
