use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    #[serde(rename = "homeTeam")]
    pub home_team: String,
    #[serde(rename = "awayTeam")]
    pub away_team: String,
    pub kickoff: Option<DateTime<Utc>>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureList {
    #[serde(rename = "seasonId", default)]
    pub season_id: String,
    pub fixtures: Vec<Fixture>,
}

impl FixtureList {
    /// Fixtures kicking off at or after `now`, soonest first.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<&Fixture> {
        let mut upcoming: Vec<&Fixture> = self
            .fixtures
            .iter()
            .filter(|f| f.kickoff.map(|k| k >= now).unwrap_or(false))
            .collect();
        upcoming.sort_by_key(|f| f.kickoff);
        upcoming
    }

    /// Drop a fixture (postponed or cancelled).
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.fixtures.len();
        self.fixtures.retain(|f| f.id != id);
        self.fixtures.len() != before
    }
}

/// A finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    #[serde(rename = "homeTeam")]
    pub home_team: String,
    #[serde(rename = "awayTeam")]
    pub away_team: String,
    #[serde(rename = "homeScore")]
    pub home_score: u32,
    #[serde(rename = "awayScore")]
    pub away_score: u32,
    #[serde(rename = "playedAt")]
    pub played_at: Option<DateTime<Utc>>,
}

impl MatchResult {
    pub fn scoreline(&self) -> String {
        format!(
            "{} {}-{} {}",
            self.home_team, self.home_score, self.away_score, self.away_team
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultList {
    #[serde(rename = "seasonId", default)]
    pub season_id: String,
    pub results: Vec<MatchResult>,
}

impl ResultList {
    /// Drop a result (e.g. annulled match).
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.results.len();
        self.results.retain(|r| r.id != id);
        self.results.len() != before
    }
}
