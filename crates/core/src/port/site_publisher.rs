// Site Publisher Port
// Abstraction over the site gateway (publishing, categories, health)

use super::collaborator::CollaboratorError;
use crate::domain::{Category, CategoryId, SiteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Post to publish
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    pub title: String,
    pub content: String,
    pub category_id: Option<CategoryId>,
}

/// Published post
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublishedPost {
    pub url: String,
    #[serde(default)]
    pub remote_id: Option<i64>,
}

/// Site health as reported by the health-check subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteHealth {
    Healthy,
    Degraded,
    Down,
}

#[async_trait]
pub trait SitePublisher: Send + Sync {
    /// Publish a post and return where it landed
    async fn publish(
        &self,
        site_id: SiteId,
        post: &PublishRequest,
    ) -> Result<PublishedPost, CollaboratorError>;

    /// All categories the site offers
    async fn list_categories(&self, site_id: SiteId) -> Result<Vec<Category>, CollaboratorError>;

    /// Current health of the site
    async fn check_health(&self, site_id: SiteId) -> Result<SiteHealth, CollaboratorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Mock Site Publisher for testing
    pub struct MockSitePublisher {
        categories: Vec<Category>,
        health: Mutex<SiteHealth>,
        failures: Mutex<VecDeque<CollaboratorError>>,
        published: Mutex<Vec<(SiteId, PublishRequest)>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockSitePublisher {
        pub fn new() -> Self {
            Self {
                categories: Vec::new(),
                health: Mutex::new(SiteHealth::Healthy),
                failures: Mutex::new(VecDeque::new()),
                published: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
            self.categories = categories;
            self
        }

        /// The next `failures.len()` publish calls fail in order
        pub fn failing_with(self, failures: Vec<CollaboratorError>) -> Self {
            *self.failures.lock().unwrap() = failures.into();
            self
        }

        /// Every publish call waits for a permit on `gate`
        pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn set_health(&self, health: SiteHealth) {
            *self.health.lock().unwrap() = health;
        }

        pub fn published(&self) -> Vec<(SiteId, PublishRequest)> {
            self.published.lock().unwrap().clone()
        }

        pub fn publish_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    impl Default for MockSitePublisher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SitePublisher for MockSitePublisher {
        async fn publish(
            &self,
            site_id: SiteId,
            post: &PublishRequest,
        ) -> Result<PublishedPost, CollaboratorError> {
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            let mut published = self.published.lock().unwrap();
            published.push((site_id, post.clone()));
            Ok(PublishedPost {
                url: format!("https://site-{}.example/posts/{}", site_id, published.len()),
                remote_id: Some(published.len() as i64),
            })
        }

        async fn list_categories(
            &self,
            _site_id: SiteId,
        ) -> Result<Vec<Category>, CollaboratorError> {
            Ok(self.categories.clone())
        }

        async fn check_health(&self, _site_id: SiteId) -> Result<SiteHealth, CollaboratorError> {
            Ok(*self.health.lock().unwrap())
        }
    }
}
