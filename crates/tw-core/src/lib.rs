//! tw-core: Core abstractions and configuration for tunwright
//!
//! This crate provides the shared domain types, the error taxonomy,
//! configuration structures, and the command executor used by the
//! reconciliation engine and the CLI.

pub mod config;
pub mod error;
pub mod exec;
pub mod parser;
pub mod pointer;
pub mod time;
pub mod types;

pub use error::TwError;
pub use exec::{CommandOptions, CommandResult, CommandRunner, CommandSpec, SystemRunner};
pub use types::{TunnelId, TunnelInfo};
