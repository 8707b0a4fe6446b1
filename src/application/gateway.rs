//! Remote data gateway: the only path to post data.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::posts::{NewPost, Post, PostPage, PostPatch};

/// Failures reported by the remote API.
///
/// `Clone` so one in-flight fetch result can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("post {id} not found")]
    NotFound { id: i64 },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request timed out")]
    Timeout,
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Network(_) => "network",
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::Validation(_) => "validation",
            GatewayError::Timeout => "timeout",
        }
    }
}

#[async_trait]
pub trait PostsGateway: Send + Sync {
    /// Load one page of posts; pages are numbered from 1.
    async fn load_posts(&self, page: u32) -> Result<PostPage, GatewayError>;

    async fn load_post(&self, id: i64) -> Result<Post, GatewayError>;

    async fn update_post(&self, id: i64, patch: &PostPatch) -> Result<Post, GatewayError>;

    async fn create_post(&self, fields: &NewPost) -> Result<Post, GatewayError>;
}
