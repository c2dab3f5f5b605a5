//! # Tessera
//!
//! Command line host for the `tessera-core` scheduler.
//!
//! - `cli`: clap commands (`run`, `discover`, `components`)
//! - `config`: TOML configuration for the scheduler and the registry
//! - `components`: built-in demo components

pub mod cli;
pub mod components;
pub mod config;
