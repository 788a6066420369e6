//! Subcommand implementations.

pub mod config;
pub mod entities;
pub mod grants;
pub mod health;
pub mod roles;
pub mod scope;
