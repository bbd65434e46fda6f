use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// One cached resource and the bookkeeping both writers share.
///
/// `fetched_at` is monotonic and drives TTL decisions; `updated_at` is
/// wall-clock and only used for display.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: Option<T>,
    /// Server version token for conditional requests. Cleared by pushes.
    pub validator: Option<String>,
    pub fetched_at: Option<Instant>,
    pub updated_at: Option<DateTime<Utc>>,
    pub(crate) write_seq: u64,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            data: None,
            validator: None,
            fetched_at: None,
            updated_at: None,
            write_seq: 0,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        match (&self.data, self.fetched_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) < ttl,
            _ => false,
        }
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.updated_at
            .map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "never".to_string();
        };
        if minutes < 1 {
            // Negative on clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
