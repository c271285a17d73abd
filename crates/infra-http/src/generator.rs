// ContentGenerator over the AI gateway

use crate::client::GatewayClient;
use async_trait::async_trait;
use autopost_core::port::{CollaboratorError, ContentGenerator, GeneratedContent, GenerationRequest};
use tracing::debug;

/// `POST {base}/generate` with the request as JSON
pub struct HttpContentGenerator {
    client: GatewayClient,
}

impl HttpContentGenerator {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        debug!(
            provider_id = request.provider_id,
            prompt_id = request.prompt_id,
            variation = request.variation,
            "Requesting generation"
        );
        let content: GeneratedContent = self
            .client
            .send_json(self.client.post("generate").json(request))
            .await?;

        if content.title.trim().is_empty() || content.content.trim().is_empty() {
            return Err(CollaboratorError::Permanent(
                "Generator returned empty title or content".into(),
            ));
        }
        Ok(content)
    }
}
