//! CLI command implementations

mod config;
mod deploy;
mod diagnose;
mod plan;
mod update_config;
mod verify;

pub use config::{config_init, config_path, config_show};
pub use deploy::deploy_command;
pub use diagnose::diagnose_command;
pub use plan::plan_command;
pub use update_config::update_config_command;
pub use verify::verify_command;
