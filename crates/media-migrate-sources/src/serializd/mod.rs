pub mod client;
pub mod auth;
pub mod api;

pub use client::SerializdClient;
pub use auth::{DestinationSession, SerializdCredentials};
