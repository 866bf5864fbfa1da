//! Node wiring for document anchoring.
//!
//! This crate turns the components of `common` into a running node:
//! - Configuration (TOML file with defaults for every setting)
//! - State management (ServiceState owning the store, job workers and handlers)
//! - Process bootstrap (logging, panic hook, graceful shutdown)

pub mod config;
pub mod process;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use state::{Externals, State as ServiceState, StateSetupError};
