use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use std::time::Duration;

use super::{ConversationService, ServiceError};
use crate::config::ServiceConfig;
use crate::models::FetchedConversation;

/// Conversation service reached over HTTP with a bearer token
#[derive(Debug, Clone)]
pub struct HttpConversationService {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpConversationService {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("smscost/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Build from config, reading the token from the configured env var
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let api_token = std::env::var(&config.api_token_env)
            .ok()
            .filter(|token| !token.trim().is_empty());
        Self::new(
            config.base_url.clone(),
            api_token,
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    /// `{base_url}/conversations/{id}` with the id percent-encoded as one segment
    fn conversation_url(&self, id: &str) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ServiceError::Configuration(format!("invalid base_url '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::Configuration(format!("base_url '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .push("conversations")
            .push(id);
        Ok(url)
    }
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn fetch_full_conversation(&self, id: &str) -> Result<FetchedConversation, ServiceError> {
        if self.base_url.is_empty() {
            return Err(ServiceError::Configuration(
                "no conversation service base_url configured".to_string(),
            ));
        }
        let Some(token) = self.api_token.as_deref() else {
            return Err(ServiceError::Configuration(
                "missing conversation service API token".to_string(),
            ));
        };

        let response = self
            .client
            .get(self.conversation_url(id)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Err(ServiceError::RateLimited { retry_after });
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ServiceError::Configuration(format!(
                    "conversation service rejected credentials ({status})"
                )));
            }
            StatusCode::NOT_FOUND => return Err(ServiceError::NotFound(id.to_string())),
            s if !s.is_success() => {
                return Err(ServiceError::Network(format!(
                    "conversation service returned {status}"
                )));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        parse_conversation_body(&body)
    }
}

/// Parse a conversation payload. An empty body counts as no messages.
pub fn parse_conversation_body(body: &str) -> Result<FetchedConversation, ServiceError> {
    if body.trim().is_empty() {
        return Ok(FetchedConversation::default());
    }
    serde_json::from_str(body).map_err(|e| ServiceError::Malformed(e.to_string()))
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
