use anyhow::Result;
use std::path::PathBuf;

/// Log file written to the working directory unless overridden.
pub const DEFAULT_LOG_FILE: &str = "migration.log";

const CONFIG_DIR_ENV: &str = "TRAKT2SERIALIZD_CONFIG_DIR";

pub struct PathManager {
    config_dir: PathBuf,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("trakt2serializd");

        Ok(Self { config_dir })
    }

    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }
}

impl Default for PathManager {
    fn default() -> Self {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Self::with_config_dir(dir);
            }
        }

        // Otherwise, use platform-specific paths (e.g., ~/.config/trakt2serializd on Linux)
        Self::new().unwrap_or_else(|_| Self::with_config_dir(".trakt2serializd"))
    }
}
