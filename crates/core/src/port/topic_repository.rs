// Topic Repository Port

use crate::domain::{SiteId, Topic, TopicId};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Add topics to a site's pool
    async fn add(&self, site_id: SiteId, titles: &[String]) -> Result<Vec<Topic>>;

    /// All topics of a site, ordered by ID
    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Topic>>;

    /// Atomically select the oldest never-used topic and mark it used
    async fn claim_unused(&self, site_id: SiteId) -> Result<Option<Topic>>;

    /// Record one more use of a topic
    async fn mark_used(&self, id: TopicId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::TimeProvider;
    use std::sync::{Arc, Mutex};

    /// In-memory TopicRepository
    pub struct InMemoryTopicRepository {
        topics: Mutex<Vec<Topic>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryTopicRepository {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                topics: Mutex::new(Vec::new()),
                time_provider,
            }
        }
    }

    #[async_trait]
    impl TopicRepository for InMemoryTopicRepository {
        async fn add(&self, site_id: SiteId, titles: &[String]) -> Result<Vec<Topic>> {
            let now = self.time_provider.now_millis();
            let mut topics = self.topics.lock().unwrap();
            let mut added = Vec::with_capacity(titles.len());
            for title in titles {
                let topic = Topic {
                    id: topics.len() as TopicId + 1,
                    site_id,
                    title: title.clone(),
                    used_count: 0,
                    last_used_at: None,
                    created_at: now,
                };
                topics.push(topic.clone());
                added.push(topic);
            }
            Ok(added)
        }

        async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Topic>> {
            Ok(self
                .topics
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.site_id == site_id)
                .cloned()
                .collect())
        }

        async fn claim_unused(&self, site_id: SiteId) -> Result<Option<Topic>> {
            let now = self.time_provider.now_millis();
            let mut topics = self.topics.lock().unwrap();
            Ok(topics
                .iter_mut()
                .find(|t| t.site_id == site_id && t.used_count == 0)
                .map(|t| {
                    t.used_count += 1;
                    t.last_used_at = Some(now);
                    t.clone()
                }))
        }

        async fn mark_used(&self, id: TopicId) -> Result<()> {
            let now = self.time_provider.now_millis();
            if let Some(t) = self.topics.lock().unwrap().iter_mut().find(|t| t.id == id) {
                t.used_count += 1;
                t.last_used_at = Some(now);
            }
            Ok(())
        }
    }
}
