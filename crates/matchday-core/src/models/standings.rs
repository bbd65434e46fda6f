use serde::{Deserialize, Serialize};

/// One team's line in the league table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(rename = "teamId")]
    pub team_id: String,
    #[serde(rename = "teamName", default)]
    pub team_name: String,
    #[serde(default)]
    pub played: u32,
    #[serde(default)]
    pub won: u32,
    #[serde(default)]
    pub drawn: u32,
    #[serde(default)]
    pub lost: u32,
    #[serde(rename = "goalsFor", default)]
    pub goals_for: u32,
    #[serde(rename = "goalsAgainst", default)]
    pub goals_against: u32,
    pub points: i32,
}

impl TableRow {
    pub fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }
}

/// Standings for one season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueTable {
    #[serde(rename = "seasonId", default)]
    pub season_id: String,
    pub rows: Vec<TableRow>,
}

impl LeagueTable {
    /// Rows ordered by points, then goal difference, then goals scored.
    pub fn ranked(&self) -> Vec<&TableRow> {
        let mut rows: Vec<&TableRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.goal_difference().cmp(&a.goal_difference()))
                .then_with(|| b.goals_for.cmp(&a.goals_for))
        });
        rows
    }

    pub fn leader(&self) -> Option<&TableRow> {
        self.ranked().into_iter().next()
    }

    /// Remove a team's row (e.g. a withdrawn team).
    pub fn remove_team(&mut self, team_id: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.team_id != team_id);
        self.rows.len() != before
    }
}
