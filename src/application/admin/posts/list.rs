//! Paginated posts table with inline title editing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use askama::Template;
use tracing::{debug, info, instrument, warn};

use crate::{
    application::gateway::PostsGateway,
    cache::{
        CacheValue, EntryStatus, Fetcher, QueryCache, QueryKey, WriteOutcome, fetcher, mutex_lock,
    },
    domain::posts::{PostPages, PostPatch},
    presentation::admin::views::{
        AdminFlashView, AdminLayout, AdminPostListTemplate, AdminPostListView, AdminPostRowView,
    },
};

use super::types::{Flash, Mounted, NextPage, PostRow, RowMode, ViewError, ViewUpdate};

const SOURCE: &str = "application::admin::posts::list";

#[derive(Default)]
struct ListState {
    modes: HashMap<i64, RowMode>,
    error: Option<Flash>,
}

/// View model for the posts table.
///
/// Row data always comes from the `["posts"]` cache entry; the view only
/// tracks per-row edit modes and the inline error message.
pub struct PostsListView {
    gateway: Arc<dyn PostsGateway>,
    cache: QueryCache,
    state: Mutex<ListState>,
    mounted: Mounted,
}

impl PostsListView {
    pub fn new(gateway: Arc<dyn PostsGateway>, cache: QueryCache) -> Self {
        Self {
            gateway,
            cache,
            state: Mutex::new(ListState::default()),
            mounted: Mounted::new(),
        }
    }

    /// Read the list through the cache, fetching page 1 on a cold cache.
    ///
    /// Resolves to the number of rows on display.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<ViewUpdate<usize>, ViewError> {
        let result = self.cache.read(QueryKey::Posts, self.list_fetcher()).await;
        if !self.mounted.get() {
            return Ok(ViewUpdate::Discarded);
        }

        match result {
            Ok(value) => {
                let rows = value.as_pages().map_or(0, PostPages::len);
                debug!(rows, "Posts list loaded");
                Ok(ViewUpdate::Applied(rows))
            }
            Err(error) => {
                self.show_error(Flash::error(format!("Could not load posts: {error}")));
                Err(error.into())
            }
        }
    }

    /// Load the page after the last one held and append it.
    ///
    /// Does nothing while any fetch for the list is running, so the page
    /// counter cannot advance twice for one page, or while a title save is
    /// waiting on the server.
    #[instrument(skip(self))]
    pub async fn fetch_next_page(&self) -> Result<NextPage, ViewError> {
        if self.cache.is_fetching(QueryKey::Posts) {
            debug!("List fetch already running; next page skipped");
            return Ok(NextPage::Skipped);
        }
        if self.cache.has_snapshot(QueryKey::Posts) {
            debug!("Title save pending; next page skipped");
            return Ok(NextPage::Skipped);
        }

        let result = self
            .cache
            .fetch(QueryKey::Posts, self.next_page_fetcher())
            .await;
        if !self.mounted.get() {
            return Ok(NextPage::Discarded);
        }

        match result {
            Ok(_) => {
                let pages = self.page_count();
                info!(pages, "Appended next page of posts");
                Ok(NextPage::Loaded { pages })
            }
            Err(error) => {
                self.show_error(Flash::error(format!("Could not load more posts: {error}")));
                Err(error.into())
            }
        }
    }

    /// Rows in display order, with their current edit mode.
    pub fn rows(&self) -> Vec<PostRow> {
        let pages = self
            .cache
            .peek(QueryKey::Posts)
            .and_then(CacheValue::into_pages)
            .unwrap_or_default();
        let state = mutex_lock(&self.state, SOURCE, "rows");

        pages
            .flatten()
            .into_iter()
            .map(|post| {
                let mode = state.modes.get(&post.id).copied().unwrap_or_default();
                PostRow { post, mode }
            })
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.cache
            .peek(QueryKey::Posts)
            .and_then(CacheValue::into_pages)
            .map_or(0, |pages| pages.page_count())
    }

    pub fn begin_edit(&self, id: i64) {
        mutex_lock(&self.state, SOURCE, "begin_edit")
            .modes
            .insert(id, RowMode::Edit);
    }

    pub fn cancel_edit(&self, id: i64) {
        let mut state = mutex_lock(&self.state, SOURCE, "cancel_edit");
        if state.modes.get(&id) == Some(&RowMode::Edit) {
            state.modes.remove(&id);
        }
    }

    /// Save a new title for one row.
    ///
    /// The row shows the new title immediately. If the server rejects the
    /// change the cached list is restored to its prior value, the inline
    /// error is shown and the gateway error is returned.
    #[instrument(skip(self, title))]
    pub async fn commit_title(
        &self,
        id: i64,
        title: impl Into<String>,
    ) -> Result<ViewUpdate<()>, ViewError> {
        let title = title.into();
        mutex_lock(&self.state, SOURCE, "commit_title.saving")
            .modes
            .insert(id, RowMode::Saving);

        let patch = PostPatch::title(title.clone());
        let outcome = self
            .cache
            .optimistic_write(
                QueryKey::Posts,
                |current| match current {
                    CacheValue::Pages(pages) => CacheValue::Pages(pages.with_title(id, &title)),
                    other => other.clone(),
                },
                || self.gateway.update_post(id, &patch),
                &[QueryKey::Post(id)],
            )
            .await;

        if !self.mounted.get() {
            return Ok(ViewUpdate::Discarded);
        }
        mutex_lock(&self.state, SOURCE, "commit_title.settled")
            .modes
            .remove(&id);

        match outcome {
            WriteOutcome::Committed(_) => {
                info!(post_id = id, "Post title updated");
                Ok(ViewUpdate::Applied(()))
            }
            WriteOutcome::RolledBack(error) => {
                warn!(post_id = id, error = %error, "Title update rejected");
                self.show_error(Flash::error(format!(
                    "Could not rename post #{id}: {error}"
                )));
                Err(error.into())
            }
        }
    }

    /// True while any fetch for the list is running, including a background
    /// refetch of data already on display.
    pub fn is_fetching(&self) -> bool {
        self.cache.is_fetching(QueryKey::Posts)
    }

    /// True only for the first load, before any rows exist.
    pub fn is_loading(&self) -> bool {
        self.cache.status(QueryKey::Posts) == EntryStatus::Loading
            && self.cache.peek(QueryKey::Posts).is_none()
    }

    pub fn error(&self) -> Option<Flash> {
        mutex_lock(&self.state, SOURCE, "error").error.clone()
    }

    pub fn dismiss_error(&self) {
        mutex_lock(&self.state, SOURCE, "dismiss_error").error = None;
    }

    pub fn render(&self) -> Result<String, ViewError> {
        let posts = self.rows().iter().map(AdminPostRowView::from).collect();
        let next_page = self
            .cache
            .peek(QueryKey::Posts)
            .and_then(CacheValue::into_pages)
            .map_or(1, |pages| pages.next_page());
        let content = AdminPostListView {
            heading: "Posts".to_string(),
            posts,
            is_loading: self.is_loading(),
            is_fetching: self.is_fetching(),
            next_page,
            error: self.error().as_ref().map(AdminFlashView::from),
            empty_message: "No posts yet.".to_string(),
        };

        let template = AdminPostListTemplate {
            view: AdminLayout::new("Posts", content),
        };
        Ok(template.render()?)
    }

    /// Stop applying async results to this view. Cache effects of operations
    /// already started still land.
    pub fn unmount(&self) {
        self.mounted.unmount();
        debug!("Posts list unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    fn show_error(&self, flash: Flash) {
        mutex_lock(&self.state, SOURCE, "show_error").error = Some(flash);
    }

    /// Refresh function for the list key: reloads every page currently held,
    /// in order, so a refetch keeps the list's length.
    fn list_fetcher(&self) -> Fetcher {
        let gateway = Arc::clone(&self.gateway);
        fetcher(move |current: Option<CacheValue>| {
            let gateway = Arc::clone(&gateway);
            let held = current
                .and_then(CacheValue::into_pages)
                .map_or(1, |pages| pages.page_count().max(1));
            async move {
                let last = u32::try_from(held).unwrap_or(u32::MAX);
                let mut pages = PostPages::new();
                for page in 1..=last {
                    pages.append(gateway.load_posts(page).await?);
                }
                Ok(CacheValue::Pages(pages))
            }
        })
    }

    fn next_page_fetcher(&self) -> Fetcher {
        let gateway = Arc::clone(&self.gateway);
        fetcher(move |current: Option<CacheValue>| {
            let gateway = Arc::clone(&gateway);
            let pages = current
                .and_then(CacheValue::into_pages)
                .unwrap_or_default();
            async move {
                let page = gateway.load_posts(pages.next_page()).await?;
                Ok(CacheValue::Pages(pages.appended(page)))
            }
        })
    }
}
