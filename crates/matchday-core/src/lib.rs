//! Matchday core - the client-side realtime data layer.
//!
//! This crate keeps league data (news, standings, fixtures, results) fresh
//! on the client by combining two sources:
//!
//! - `transport`: one authenticated push socket multiplexing many topics,
//!   with heartbeat and reconnect backoff
//! - `cache`: per-resource TTL caches filled over REST through `api`, and
//!   patched in place by push frames
//!
//! The composition root builds one [`Session`] and one [`CacheStore`] and
//! shares them; nothing here is a global.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, FetchError, FetchResponse, Fetcher};
pub use cache::{CacheStore, CachedResource, FetchOptions, FetchOutcome, ResourceError, ResourceKind};
pub use config::Config;
pub use transport::{ConnectionState, MessageKind, Session, WsConnector};
