//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the TOML configuration file and
//! turns it into the [`crate::ClientConfig`] the session runs with.

pub mod config;
