//! CLI subcommands.

pub mod completions;
pub mod config;
pub mod daemon;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::Result;
use minisync_core::config::Config;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub format: OutputFormat,
    config_path: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config_path: Option<PathBuf>) -> Self {
        Self {
            format,
            config_path,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// The `--config` path, or the default location.
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    /// Effective configuration, including `MINISYNC_*` overrides, exactly as
    /// the daemon would see it.
    pub fn load_config(&self) -> Result<Config> {
        Config::load_with_overrides(self.config_path.as_deref(), |name| std::env::var(name).ok())
    }
}
