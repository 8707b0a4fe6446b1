use crate::domain::posts::{Post, PostPages};

/// Data held by a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Post(Post),
    Pages(PostPages),
}

impl CacheValue {
    pub fn as_post(&self) -> Option<&Post> {
        match self {
            CacheValue::Post(post) => Some(post),
            CacheValue::Pages(_) => None,
        }
    }

    pub fn as_pages(&self) -> Option<&PostPages> {
        match self {
            CacheValue::Pages(pages) => Some(pages),
            CacheValue::Post(_) => None,
        }
    }

    pub fn into_post(self) -> Option<Post> {
        match self {
            CacheValue::Post(post) => Some(post),
            CacheValue::Pages(_) => None,
        }
    }

    pub fn into_pages(self) -> Option<PostPages> {
        match self {
            CacheValue::Pages(pages) => Some(pages),
            CacheValue::Post(_) => None,
        }
    }
}

impl From<Post> for CacheValue {
    fn from(post: Post) -> Self {
        CacheValue::Post(post)
    }
}

impl From<PostPages> for CacheValue {
    fn from(pages: PostPages) -> Self {
        CacheValue::Pages(pages)
    }
}
