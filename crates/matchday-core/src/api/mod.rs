//! REST API client module for the league data service.
//!
//! This module provides the `Fetcher` seam the cache store talks to, and
//! `ApiClient`, its reqwest-backed implementation.
//!
//! Every endpoint answers with a `{ok, data, error}` envelope. Responses
//! may carry a validator (an `ETag` header or `meta.version`) that can be
//! sent back as `If-None-Match` to get a `304 Not Modified`.

pub mod client;
pub mod error;

pub use client::{ApiClient, FetchResponse, Fetcher};
pub use error::FetchError;
