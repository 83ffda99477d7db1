//! Configuration loading and validation

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Example configuration written by `crowdsynth init`
pub const EXAMPLE_CONFIG: &str = include_str!("../../crowdsynth.example.yaml");

/// Load configuration from a YAML file
pub fn load_config(path: &Path) -> Result<SynthConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate configuration text
pub fn parse_config(contents: &str) -> Result<SynthConfig> {
    let config: SynthConfig = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}
