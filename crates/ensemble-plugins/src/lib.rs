//! # Ensemble Plugins
//!
//! The plugin runtime: discovers extension packages under a plugins root,
//! loads each one in isolation, keeps an authoritative registry, and exposes
//! a single safe invocation gateway.
//!
//! Plugins run out of process. Each plugin directory carries an entry file
//! (`main.py` or `main.sh`) speaking a one-line-JSON protocol over
//! stdin/stdout; the host never loads plugin code into its own address
//! space, so internal names of one plugin can never collide with the host's
//! or another plugin's.

pub mod discovery;
pub mod environment;
pub mod host;
pub mod loader;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod watch;

pub use discovery::{DiscoveredPlugin, PluginDiscovery};
pub use environment::PluginEnvironment;
pub use host::{HostError, ProcessHost};
pub use loader::PluginLoader;
pub use manager::{PluginCallError, PluginManager};
pub use registry::{PluginRegistry, RegistryError};
pub use watch::{start_watching, PluginRootWatcher};
