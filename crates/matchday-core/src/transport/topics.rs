/// The topics the application wants live updates for, independent of
/// whether a socket is currently open.
///
/// Membership is what matters; insertion order is kept only so replays
/// after a reconnect are deterministic.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    topics: Vec<String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `topic`. Returns false if it was already desired.
    pub fn insert(&mut self, topic: &str) -> bool {
        if self.contains(topic) {
            return false;
        }
        self.topics.push(topic.to_string());
        true
    }

    /// Remove `topic`. Returns false if it was not desired.
    pub fn remove(&mut self, topic: &str) -> bool {
        let before = self.topics.len();
        self.topics.retain(|t| t != topic);
        self.topics.len() != before
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut topics = TopicRegistry::new();
        assert!(topics.insert("standings:2024"));
        assert!(!topics.insert("standings:2024"));
        assert_eq!(topics.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut topics = TopicRegistry::new();
        topics.insert("news");
        assert!(!topics.remove("fixtures:2024"));
        assert!(topics.remove("news"));
        assert!(topics.is_empty());
    }

    #[test]
    fn test_iter_keeps_insertion_order() {
        let mut topics = TopicRegistry::new();
        topics.insert("b");
        topics.insert("a");
        topics.insert("c");
        topics.remove("a");
        topics.insert("a");
        assert_eq!(topics.iter().collect::<Vec<_>>(), vec!["b", "c", "a"]);
    }
}
