// Content Generator Port
// Abstraction over the AI provider gateway

use super::collaborator::CollaboratorError;
use crate::domain::{PromptId, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to generate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub provider_id: ProviderId,
    pub prompt_id: PromptId,
    pub placeholders: BTreeMap<String, String>,
    /// Ask for a re-worded variation of an already used topic
    pub variation: bool,
}

/// Generated article
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedContent {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tokens_used: Option<i64>,
}

/// Content generator trait
///
/// Implementations:
/// - HttpContentGenerator: forwards to the AI gateway
/// - mocks::MockContentGenerator: scripted results for tests
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate content for a job run
    ///
    /// # Errors
    /// - CollaboratorError::Transient for rate limits and provider hiccups
    /// - CollaboratorError::Permanent for auth / invalid request
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Mock generator behavior
    #[derive(Debug, Clone)]
    pub enum GeneratorBehavior {
        /// Return content titled after the `title` placeholder
        Success,
        Transient(String),
        Permanent(String),
        /// Panic (for panic isolation testing)
        Panic(String),
    }

    /// Mock Content Generator for testing
    ///
    /// Scripted behaviors are consumed first; afterwards the default applies.
    pub struct MockContentGenerator {
        default: GeneratorBehavior,
        script: Mutex<VecDeque<GeneratorBehavior>>,
        requests: Mutex<Vec<GenerationRequest>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockContentGenerator {
        pub fn new(default: GeneratorBehavior) -> Self {
            Self {
                default,
                script: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        pub fn new_success() -> Self {
            Self::new(GeneratorBehavior::Success)
        }

        /// Play `script` before falling back to `default`
        pub fn scripted(script: Vec<GeneratorBehavior>, default: GeneratorBehavior) -> Self {
            let mock = Self::new(default);
            *mock.script.lock().unwrap() = script.into();
            mock
        }

        /// Every call waits for a permit on `gate` before answering
        pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentGenerator for MockContentGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GeneratedContent, CollaboratorError> {
            self.requests.lock().unwrap().push(request.clone());

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let behavior = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default.clone());

            match behavior {
                GeneratorBehavior::Success => {
                    let title = request
                        .placeholders
                        .get("title")
                        .cloned()
                        .unwrap_or_else(|| "Untitled".to_string());
                    Ok(GeneratedContent {
                        content: format!("<p>{}</p>", title),
                        title,
                        tokens_used: Some(100),
                    })
                }
                GeneratorBehavior::Transient(msg) => Err(CollaboratorError::Transient(msg)),
                GeneratorBehavior::Permanent(msg) => Err(CollaboratorError::Permanent(msg)),
                GeneratorBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
            }
        }
    }
}
