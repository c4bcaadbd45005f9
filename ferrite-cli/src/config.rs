//! CLI configuration, loaded from a TOML file.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use ferrite_core::CoreConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CliConfig {
    /// Core tunables (noise floor, buffer maxima, PSK settle trim).
    #[serde(default)]
    pub core: CoreConfig,
    /// Prompt shown by the interactive console.
    #[serde(default)]
    pub prompt: Option<String>,
    /// JSONL command log destination.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read config {}", path.display()))?;
        toml::from_str(&text).wrap_err_with(|| format!("cannot parse config {}", path.display()))
    }
}
