//! Chat Realtime - Main Library
//!
//! Application layer around the `chatlink` connection manager.
//!
//! ## Architecture
//!
//! - **chatlink**: Realtime connection manager (re-exported from workspace)
//! - **config**: YAML + environment client configuration
//! - **logging**: Tracing initialization
//! - **bin_common**: Common utilities for binary executables
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use chat_realtime::bin_common::{load_config_from_env, ConfigType};
//! use chat_realtime::config::ClientConfig;
//! ```

// Re-export workspace libraries for convenience
pub use chatlink;

pub mod config;
pub mod logging;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
}
