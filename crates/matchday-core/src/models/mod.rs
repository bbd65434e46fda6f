//! Data models for league entities.
//!
//! This module contains the payloads the cache stores for each resource
//! kind:
//!
//! - `NewsFeed`, `NewsItem`: the latest-news feed
//! - `LeagueTable`, `TableRow`: season standings
//! - `FixtureList`, `Fixture`: upcoming matches for a season
//! - `ResultList`, `MatchResult`: finished matches for a season

pub mod fixture;
pub mod news;
pub mod standings;

pub use fixture::{Fixture, FixtureList, MatchResult, ResultList};
pub use news::{NewsFeed, NewsItem};
pub use standings::{LeagueTable, TableRow};
