//! View models for the admin client.

pub mod posts;

use std::sync::Arc;

use crate::{
    application::gateway::PostsGateway,
    cache::{CacheConfig, QueryCache},
};

use self::posts::{PostEditView, PostsListView};

/// Shared dependencies for every admin view: the gateway and one query
/// cache for the whole session.
#[derive(Clone)]
pub struct AdminContext {
    gateway: Arc<dyn PostsGateway>,
    cache: QueryCache,
}

impl AdminContext {
    pub fn new(gateway: Arc<dyn PostsGateway>, config: CacheConfig) -> Self {
        Self {
            gateway,
            cache: QueryCache::new(config),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn gateway(&self) -> &Arc<dyn PostsGateway> {
        &self.gateway
    }

    pub fn posts_list(&self) -> PostsListView {
        PostsListView::new(Arc::clone(&self.gateway), self.cache.clone())
    }

    pub fn post_edit(&self, id: i64) -> PostEditView {
        PostEditView::new(id, Arc::clone(&self.gateway), self.cache.clone())
    }

    /// Drop every cached query.
    pub fn shutdown(&self) {
        self.cache.clear();
    }
}
