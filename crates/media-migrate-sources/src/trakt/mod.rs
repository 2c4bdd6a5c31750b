pub mod client;
pub mod auth;
pub mod api;

pub use client::TraktClient;

pub(crate) const API_BASE: &str = "https://api.trakt.tv";
