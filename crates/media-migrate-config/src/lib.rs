pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, MarkingConfig, MatchingConfig, RateLimitConfig, SerializdConfig, TraktConfig};
pub use credentials::CredentialStore;
pub use paths::{PathManager, DEFAULT_LOG_FILE};
