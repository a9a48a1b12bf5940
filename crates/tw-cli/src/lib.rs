//! tw-cli: Command-line interface for tunwright
//!
//! Provides the `tunwright` binary that drives the reconciliation engine
//! and renders its reports for a terminal.

pub mod commands;
pub mod output;
