//! Multi-port Server
//!
//! One accept loop per configured port, the registry that tracks them, and the
//! coordinator that reconciles both with a reloaded configuration.

pub mod context;
pub mod listener;
pub mod passwords;
pub mod reload;

pub use context::{PortUpdate, ServerContext};
pub use listener::ListenerHandle;
pub use passwords::{PasswordManager, PortListener};
pub use reload::{ReloadCoordinator, ReloadSummary, ReloadTrigger};
