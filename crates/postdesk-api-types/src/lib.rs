//! Wire types exchanged with the blog posts API.
//!
//! Shared by the admin client and anything that needs to speak the same JSON
//! shapes (fixtures, mock servers).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Publication state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    /// Map the edit form's `published` checkbox to a status.
    pub fn from_published_flag(published: bool) -> Self {
        if published {
            PostStatus::Published
        } else {
            PostStatus::Draft
        }
    }

    pub fn is_published(self) -> bool {
        matches!(self, PostStatus::Published)
    }
}

/// A blog post as returned by the API. `id` is assigned by the server and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub date_created: OffsetDateTime,
}

/// One page of posts as returned by the list endpoint.
pub type PostPage = Vec<Post>;

/// Partial update of a post. Absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
}

impl PostPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.status.is_none()
    }

    /// Apply the patch to a local copy of a post.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title.clone_from(title);
        }
        if let Some(content) = &self.content {
            post.content.clone_from(content);
        }
        if let Some(status) = self.status {
            post.status = status;
        }
    }
}

/// Fields accepted when creating a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
}

/// Error body returned by the API on rejected writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
