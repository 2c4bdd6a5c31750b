pub mod traits;
pub mod error;
pub mod cancel;
pub mod http;
pub mod retry;
pub mod rate_limit;
pub mod trakt;
pub mod serializd;

pub use traits::{Destination, HistorySource};
pub use error::MigrateError;
pub use cancel::CancellationFlag;
pub use retry::{retry_with_backoff, Backoff};
pub use rate_limit::RateLimiter;
pub use trakt::TraktClient;
pub use serializd::{SerializdClient, SerializdCredentials};
