//! Print or validate the active gateway configuration.

use anyhow::Result;

use super::load_config;

pub fn run(config_path: Option<String>) -> Result<()> {
    let config = load_config(&config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{}", toml_str);
    Ok(())
}
