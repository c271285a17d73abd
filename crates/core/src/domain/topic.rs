// Topic & Category Domain Model

use super::job::{CategoryId, SiteId};
use serde::{Deserialize, Serialize};

pub type TopicId = i64;

/// A topic in a site's pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub site_id: SiteId,
    pub title: String,
    pub used_count: i64,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

/// A category as reported by the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}
