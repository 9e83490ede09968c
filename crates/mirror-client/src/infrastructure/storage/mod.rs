//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory (or an explicit `--config` path), fills in
//! defaults for anything missing, and converts the result into the typed
//! configuration structs the application layer consumes.

pub mod config;
