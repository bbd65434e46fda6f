use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{FixtureList, LeagueTable, NewsFeed, ResultList};

/// The server-owned collections the client caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    News,
    Standings,
    Fixtures,
    Results,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::News,
        ResourceKind::Standings,
        ResourceKind::Fixtures,
        ResourceKind::Results,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::News => "news",
            ResourceKind::Standings => "standings",
            ResourceKind::Fixtures => "fixtures",
            ResourceKind::Results => "results",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string or number field, as a string.
fn id_field(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Describes how one resource kind is fetched, keyed, and patched by pushes.
pub trait Resource: Send + Sync + 'static {
    const KIND: ResourceKind;
    type Data: DeserializeOwned + Clone + Send + Sync + 'static;

    /// REST path for `key`, relative to the API base URL.
    fn path(key: &str) -> String {
        format!("{}/{}", Self::KIND, key)
    }

    /// Push topic carrying updates for `key`.
    fn topic(key: &str) -> String {
        format!("{}:{}", Self::KIND, key)
    }

    /// Field in push payloads naming the key.
    const KEY_FIELD: &'static str;

    /// The key a push refers to: the payload's key field, else the topic suffix.
    fn push_key(payload: &Value, topic: Option<&str>) -> Option<String> {
        id_field(payload, Self::KEY_FIELD).or_else(|| {
            let prefix = format!("{}:", Self::KIND);
            topic
                .and_then(|t| t.strip_prefix(prefix.as_str()))
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        })
    }

    /// Decode a replace payload. The data may be wrapped in a `data` field.
    fn push_data(payload: &Value) -> Option<Self::Data> {
        let body = payload.get("data").unwrap_or(payload);
        serde_json::from_value(body.clone())
            .ok()
            .filter(|data| Self::validate(data))
    }

    /// Shape checks beyond what deserialization enforces.
    fn validate(_data: &Self::Data) -> bool {
        true
    }

    /// The item id a remove payload targets.
    fn push_item_id(payload: &Value) -> Option<String> {
        id_field(payload, "id")
    }

    /// Remove one item from the collection. Returns false if absent.
    fn remove_item(data: &mut Self::Data, id: &str) -> bool;
}

/// Latest-news feed, keyed by feed name (usually `latest`).
pub struct NewsResource;

impl Resource for NewsResource {
    const KIND: ResourceKind = ResourceKind::News;
    const KEY_FIELD: &'static str = "feed";
    type Data = NewsFeed;

    fn push_key(payload: &Value, topic: Option<&str>) -> Option<String> {
        id_field(payload, Self::KEY_FIELD)
            .or_else(|| {
                topic
                    .and_then(|t| t.strip_prefix("news:"))
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| Some(NewsResource::DEFAULT_FEED.to_string()))
    }

    fn remove_item(data: &mut NewsFeed, id: &str) -> bool {
        data.remove(id)
    }
}

impl NewsResource {
    pub const DEFAULT_FEED: &'static str = "latest";
}

/// League table, keyed by season id.
pub struct StandingsResource;

impl Resource for StandingsResource {
    const KIND: ResourceKind = ResourceKind::Standings;
    const KEY_FIELD: &'static str = "seasonId";
    type Data = LeagueTable;

    fn validate(data: &LeagueTable) -> bool {
        !data.season_id.is_empty()
    }

    fn push_item_id(payload: &Value) -> Option<String> {
        id_field(payload, "teamId").or_else(|| id_field(payload, "id"))
    }

    fn remove_item(data: &mut LeagueTable, id: &str) -> bool {
        data.remove_team(id)
    }
}

/// Upcoming fixtures, keyed by season id.
pub struct FixturesResource;

impl Resource for FixturesResource {
    const KIND: ResourceKind = ResourceKind::Fixtures;
    const KEY_FIELD: &'static str = "seasonId";
    type Data = FixtureList;

    fn remove_item(data: &mut FixtureList, id: &str) -> bool {
        data.remove(id)
    }
}

/// Finished matches, keyed by season id.
pub struct ResultsResource;

impl Resource for ResultsResource {
    const KIND: ResourceKind = ResourceKind::Results;
    const KEY_FIELD: &'static str = "seasonId";
    type Data = ResultList;

    fn remove_item(data: &mut ResultList, id: &str) -> bool {
        data.remove(id)
    }
}
