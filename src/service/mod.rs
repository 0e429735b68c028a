// Conversation service boundary
pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::FetchedConversation;

pub use http::HttpConversationService;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("rate limited by conversation service")]
    RateLimited { retry_after: Option<Duration> },
    #[error("conversation service is misconfigured: {0}")]
    Configuration(String),
    #[error("conversation {0} not found")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Source of full, structured conversation content
///
/// Implementations must report throttling as [`ServiceError::RateLimited`]. A
/// conversation with no message content is a valid, empty result.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn fetch_full_conversation(&self, id: &str) -> Result<FetchedConversation, ServiceError>;
}
