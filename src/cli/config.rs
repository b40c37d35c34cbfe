// ABOUTME: Configuration management for the taskweave application
// ABOUTME: Handles loading and merging configuration from files and environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            _ => Config::default(),
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local = [
            PathBuf::from("taskweave.yaml"),
            PathBuf::from("taskweave.yml"),
            PathBuf::from(".taskweave.yaml"),
            PathBuf::from(".taskweave.yml"),
        ];

        if let Some(path) = local.into_iter().find(|p| p.exists()) {
            return Some(path);
        }

        dirs::home_dir()
            .map(|home| home.join(".taskweave").join("config.yaml"))
            .filter(|p| p.exists())
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TASKWEAVE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TASKWEAVE_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(workers) = lookup("TASKWEAVE_MAX_WORKERS") {
            self.scheduler.max_workers = workers
                .parse()
                .context("TASKWEAVE_MAX_WORKERS must be a positive integer")?;
        }
        if let Some(instances) = lookup("TASKWEAVE_MAX_INSTANCES") {
            self.scheduler.max_instances = instances
                .parse()
                .context("TASKWEAVE_MAX_INSTANCES must be a positive integer")?;
        }

        Ok(())
    }
}
