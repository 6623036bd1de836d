use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub settings_dir: PathBuf,
    pub enable_hot_reload: bool,
    pub log_level: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            settings_dir: Self::default_settings_dir(),
            enable_hot_reload: true,
            log_level: "info".to_string(),
        }
    }
}

impl FilterConfig {
    /// Returns the default absolute path for the settings directory.
    /// Falls back to current directory + voicecall-filter if the user config
    /// dir cannot be determined.
    fn default_settings_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("voicecall-filter")
    }

    pub fn from_env() -> Result<Self> {
        let mut config = FilterConfig::default();

        if let Ok(dir) = env::var("FILTER_SETTINGS_DIR") {
            if !dir.trim().is_empty() {
                let path = PathBuf::from(&dir);
                config.settings_dir = if path.is_absolute() {
                    path
                } else {
                    env::current_dir()
                        .unwrap_or_else(|_| PathBuf::from("."))
                        .join(path)
                };
            }
        }

        if let Ok(flag) = env::var("ENABLE_HOT_RELOAD") {
            config.enable_hot_reload =
                parse_bool(&flag).context("failed to parse ENABLE_HOT_RELOAD as bool")?;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.log_level = level;
            }
        }

        config.validate()?;

        info!(
            settings_dir = %config.settings_dir.display(),
            hot_reload = config.enable_hot_reload,
            "filter settings directory resolved"
        );

        Ok(config)
    }

    /// A missing settings directory is tolerated, the filter then runs with
    /// empty lists. A path that exists but is not a directory is rejected.
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log level must not be empty"));
        }

        match fs::metadata(&self.settings_dir) {
            Ok(metadata) if !metadata.is_dir() => Err(anyhow!(
                "settings path '{}' is not a directory",
                self.settings_dir.display()
            )),
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(
                    settings_dir = %self.settings_dir.display(),
                    error = %err,
                    "settings directory not accessible; number lists will stay empty"
                );
                Ok(())
            }
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value.parse::<bool>().or_else(|_| match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(anyhow!("invalid boolean value: {}", other)),
    })
}
