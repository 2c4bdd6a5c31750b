use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub trakt: Option<TraktConfig>,
    #[serde(default)]
    pub serializd: Option<SerializdConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub marking: MarkingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TraktConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SerializdConfig {
    /// Login email. The password is never stored.
    pub email: String,
}

/// Request budget for the destination, per window.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Base backoff when a 429 carries no Retry-After header
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_true")]
    pub title_fallback: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MarkingConfig {
    #[serde(default = "default_true")]
    pub prefer_season_bulk: bool,
    /// Share of a season's episodes that must be watched to log it in bulk
    #[serde(default = "default_season_complete_ratio")]
    pub season_complete_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    10
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_season_complete_ratio() -> f64 {
    1.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            title_fallback: true,
        }
    }
}

impl Default for MarkingConfig {
    fn default() -> Self {
        Self {
            prefer_season_bulk: true,
            season_complete_ratio: default_season_complete_ratio(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file, or defaults when it does not exist yet
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(anyhow::anyhow!("rate_limit.max_requests must be at least 1"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(anyhow::anyhow!("rate_limit.window_secs must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.matching.similarity_threshold) {
            return Err(anyhow::anyhow!(
                "matching.similarity_threshold must be between 0 and 1, got {}",
                self.matching.similarity_threshold
            ));
        }
        if !(self.marking.season_complete_ratio > 0.0 && self.marking.season_complete_ratio <= 1.0) {
            return Err(anyhow::anyhow!(
                "marking.season_complete_ratio must be in (0, 1], got {}",
                self.marking.season_complete_ratio
            ));
        }
        Ok(())
    }

    pub fn is_trakt_configured(&self) -> bool {
        if let Some(ref trakt) = self.trakt {
            !trakt.client_id.is_empty()
                && trakt.client_id != "YOUR_CLIENT_ID"
                && !trakt.client_secret.is_empty()
                && trakt.client_secret != "YOUR_CLIENT_SECRET"
        } else {
            false
        }
    }

    pub fn serializd_email(&self) -> Option<&str> {
        self.serializd
            .as_ref()
            .map(|s| s.email.as_str())
            .filter(|email| !email.is_empty())
    }
}
