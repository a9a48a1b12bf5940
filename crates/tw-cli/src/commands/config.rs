//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use tw_core::config::{self, DeployConfig};

/// Show the effective configuration and where it came from
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    match config::resolve_config_path(config_path) {
        Some(path) => print_info(&format!("Configuration file: {:?}", path)),
        None => {
            print_warning("No configuration file found, showing built-in defaults");
            print_info("Run 'tunwright config init' to create one");
        }
    }
    println!();

    let effective = config::load_deploy_config(config_path).context("Failed to load configuration")?;
    let rendered = toml::to_string_pretty(&effective).context("Failed to render configuration")?;
    println!("{}", rendered);

    Ok(())
}

/// Print the per-user configuration file path
pub fn config_path() {
    println!("{}", config::default_config_path().display());
}

/// Write a default `tunwright.toml`
///
/// Targets `config_path` when given, otherwise the working directory.
/// An existing file is only replaced with `force`.
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(config::PROJECT_CONFIG_FILE));

    if config_file.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_file));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&config_file, &DeployConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

    print_success(&format!("Created configuration file: {:?}", config_file));
    print_info("Set [tunnel] name and hostnames, then run 'tunwright diagnose'");

    Ok(())
}
