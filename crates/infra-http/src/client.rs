// Shared gateway client with transient/permanent error classification

use autopost_core::port::CollaboratorError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body quoted back in a CollaboratorError
const MAX_ERROR_BODY: usize = 300;

/// Base URL plus optional bearer token for one gateway
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("autopost-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollaboratorError::Permanent(format!("HTTP client setup: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and decode a JSON body, classifying every failure
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let response = request.send().await.map_err(classify_transport)?;
        let response = check_status(response).await?;
        response.json::<T>().await.map_err(|e| {
            CollaboratorError::Permanent(format!("Malformed gateway response: {}", e))
        })
    }
}

async fn check_status(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    debug!(%url, status = status.as_u16(), "Gateway call failed");
    Err(classify_status(status, &body))
}

/// Map a non-success HTTP status to a retry class
///
/// 408, 425, 429 and every 5xx are transient. Anything else is permanent.
pub fn classify_status(status: StatusCode, body: &str) -> CollaboratorError {
    let message = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };
    match status.as_u16() {
        408 | 425 | 429 => CollaboratorError::Transient(message),
        s if s >= 500 => CollaboratorError::Transient(message),
        _ => CollaboratorError::Permanent(message),
    }
}

fn classify_transport(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Transient(format!("Gateway timeout: {}", err))
    } else if err.is_connect() || err.is_request() {
        CollaboratorError::Transient(format!("Gateway unreachable: {}", err))
    } else if err.is_builder() {
        CollaboratorError::Permanent(format!("Invalid gateway request: {}", err))
    } else {
        CollaboratorError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for code in [408, 425, 429, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(classify_status(status, "").is_transient(), "{}", code);
        }
        for code in [400, 401, 403, 404, 409, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!classify_status(status, "").is_transient(), "{}", code);
        }
    }

    #[test]
    fn test_message_quotes_body() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(err, CollaboratorError::Permanent("HTTP 401: bad key".into()));
    }

    #[test]
    fn test_url_joining() {
        let client = GatewayClient::new("http://gw.local/api/", None).unwrap();
        assert_eq!(client.url("/sites/3/posts"), "http://gw.local/api/sites/3/posts");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transient() {
        // Port 9 (discard) is closed on test machines
        let client = GatewayClient::new("http://127.0.0.1:9", None).unwrap();
        let result: Result<serde_json::Value, _> = client.send_json(client.get("health")).await;
        assert!(result.unwrap_err().is_transient());
    }
}
