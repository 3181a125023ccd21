//! CLI command implementations.

pub mod common;
pub mod config;
pub mod reconstruct;
pub mod simulate;
pub mod stage;
