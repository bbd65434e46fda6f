//! Client-side resource cache.
//!
//! This module provides `CacheStore`, which keeps one in-memory entry per
//! (resource kind, key) and reconciles two writers:
//!
//! - REST fetches, issued by `ensure_fresh` when an entry is older than
//!   its TTL (deduplicated per key, conditional when a validator is known)
//! - realtime pushes routed from the session's dispatcher, which always
//!   write straight into the entry
//!
//! A per-cache sequence number decides which writer wins: a fetch only
//! commits its body if nothing newer wrote the entry after it was issued.

pub mod entry;
pub mod resource;
pub mod store;

pub use entry::CacheEntry;
pub use resource::{
    FixturesResource, NewsResource, Resource, ResourceKind, ResultsResource, StandingsResource,
};
pub use store::{
    CacheAges, CacheStore, CachedResource, FetchOptions, FetchOutcome, ResourceCache, ResourceError,
};
