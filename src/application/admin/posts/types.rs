use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::{
    application::gateway::GatewayError,
    cache::QueryKey,
    domain::posts::{Post, PostPatch, PostStatus},
};

/// Confirmation shown after the edit form is saved.
pub const SAVED_MESSAGE: &str = "The post has been saved";

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no data cached for {key}")]
    MissingData { key: QueryKey },
    #[error("failed to render view: {0}")]
    Render(#[from] askama::Error),
}

/// Result of an async view operation.
///
/// Once a view is unmounted, late results still reach the cache but no
/// longer touch view state; the operation then reports `Discarded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate<T> {
    Applied(T),
    Discarded,
}

impl<T> ViewUpdate<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            ViewUpdate::Applied(value) => Some(value),
            ViewUpdate::Discarded => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, ViewUpdate::Discarded)
    }
}

/// Outcome of asking the list for another page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// The page was appended; the list now holds `pages` pages.
    Loaded { pages: usize },
    /// A fetch for the list was already running; nothing was started.
    Skipped,
    /// The view was unmounted before the page arrived.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            text: text.into(),
        }
    }
}

/// Display mode of a row in the posts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMode {
    #[default]
    View,
    Edit,
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRow {
    pub post: Post,
    pub mode: RowMode,
}

/// Values bound to the edit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub published: bool,
}

impl PostForm {
    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            content: post.content.clone(),
            published: post.status.is_published(),
        }
    }

    /// The full update sent on submit. The published checkbox maps to the
    /// two-state status.
    pub fn to_patch(&self) -> PostPatch {
        PostPatch {
            title: Some(self.title.clone()),
            content: Some(self.content.clone()),
            status: Some(PostStatus::from_published_flag(self.published)),
        }
    }
}

/// Tracks whether the owning view is still displayed.
#[derive(Debug)]
pub(crate) struct Mounted(AtomicBool);

impl Mounted {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn unmount(&self) {
        self.0.store(false, Ordering::Release);
    }
}
