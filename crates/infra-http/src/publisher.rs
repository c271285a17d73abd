// SitePublisher over the site gateway

use crate::client::GatewayClient;
use async_trait::async_trait;
use autopost_core::domain::{Category, SiteId};
use autopost_core::port::{CollaboratorError, PublishRequest, PublishedPost, SiteHealth, SitePublisher};
use serde::Deserialize;
use tracing::debug;

/// Routes under `{base}/sites/{site_id}/`
pub struct HttpSitePublisher {
    client: GatewayClient,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: SiteHealth,
}

impl HttpSitePublisher {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }
}

fn site_path(site_id: SiteId, leaf: &str) -> String {
    format!("sites/{}/{}", site_id, leaf)
}

#[async_trait]
impl SitePublisher for HttpSitePublisher {
    async fn publish(
        &self,
        site_id: SiteId,
        post: &PublishRequest,
    ) -> Result<PublishedPost, CollaboratorError> {
        debug!(site_id, category_id = ?post.category_id, "Publishing post");
        self.client
            .send_json(self.client.post(&site_path(site_id, "posts")).json(post))
            .await
    }

    async fn list_categories(&self, site_id: SiteId) -> Result<Vec<Category>, CollaboratorError> {
        self.client
            .send_json(self.client.get(&site_path(site_id, "categories")))
            .await
    }

    async fn check_health(&self, site_id: SiteId) -> Result<SiteHealth, CollaboratorError> {
        let body: HealthBody = self
            .client
            .send_json(self.client.get(&site_path(site_id, "health")))
            .await?;
        Ok(body.status)
    }
}
