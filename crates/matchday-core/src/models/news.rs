use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub items: Vec<NewsItem>,
}

impl NewsFeed {
    /// Remove the item with `id`. Returns false if it was not in the feed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    /// Items newest first; undated items sort last.
    pub fn latest(&self) -> Vec<&NewsItem> {
        let mut items: Vec<&NewsItem> = self.items.iter().collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_news_feed() {
        let json = r#"{"items": [
            {"id": "n1", "title": "Derby preview", "publishedAt": "2024-03-01T10:00:00Z"},
            {"id": "n2", "title": "Injury update", "publishedAt": "2024-03-02T08:30:00Z", "summary": "Out for two weeks"}
        ]}"#;
        let feed: NewsFeed = serde_json::from_str(json).expect("Failed to parse news feed JSON");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.latest()[0].id, "n2");
        assert_eq!(feed.items[1].summary.as_deref(), Some("Out for two weeks"));
    }

    #[test]
    fn test_feed_requires_items() {
        assert!(serde_json::from_str::<NewsFeed>(r#"{"headline": "x"}"#).is_err());
        let empty: NewsFeed = serde_json::from_str(r#"{"items": []}"#).expect("empty feed is valid");
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_remove_item() {
        let mut feed = NewsFeed {
            items: vec![NewsItem {
                id: "n1".to_string(),
                title: "Derby preview".to_string(),
                summary: None,
                published_at: None,
                url: None,
            }],
        };
        assert!(!feed.remove("missing"));
        assert_eq!(feed.items.len(), 1);
        assert!(feed.remove("n1"));
        assert!(feed.items.is_empty());
    }
}
