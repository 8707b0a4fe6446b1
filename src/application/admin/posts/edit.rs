//! Single-post edit form.

use std::sync::{Arc, Mutex};

use askama::Template;
use tracing::{debug, info, instrument, warn};

use crate::{
    application::gateway::PostsGateway,
    cache::{CacheValue, EntryStatus, Fetcher, QueryCache, QueryKey, fetcher, mutex_lock},
    domain::posts::Post,
    presentation::admin::views::{
        AdminFlashView, AdminLayout, AdminPostEditTemplate, AdminPostEditorView,
    },
};

use super::types::{Flash, Mounted, PostForm, SAVED_MESSAGE, ViewError, ViewUpdate};

const SOURCE: &str = "application::admin::posts::edit";

#[derive(Default)]
struct EditState {
    flash: Option<Flash>,
    updating: bool,
}

/// View model for the edit form of one post, bound to `["posts", id]`.
///
/// Submitting is not optimistic: the form waits for the server, then marks
/// every posts query stale so the list picks up the change.
pub struct PostEditView {
    id: i64,
    gateway: Arc<dyn PostsGateway>,
    cache: QueryCache,
    state: Mutex<EditState>,
    mounted: Mounted,
}

impl PostEditView {
    pub fn new(id: i64, gateway: Arc<dyn PostsGateway>, cache: QueryCache) -> Self {
        Self {
            id,
            gateway,
            cache,
            state: Mutex::new(EditState::default()),
            mounted: Mounted::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    fn key(&self) -> QueryKey {
        QueryKey::Post(self.id)
    }

    #[instrument(skip(self), fields(post_id = self.id))]
    pub async fn load(&self) -> Result<ViewUpdate<Post>, ViewError> {
        let result = self.cache.read(self.key(), self.post_fetcher()).await;
        if !self.mounted.get() {
            return Ok(ViewUpdate::Discarded);
        }

        match result {
            Ok(value) => value
                .into_post()
                .map(ViewUpdate::Applied)
                .ok_or(ViewError::MissingData { key: self.key() }),
            Err(error) => {
                self.show_flash(Flash::error(format!("Could not load post: {error}")));
                Err(error.into())
            }
        }
    }

    pub fn post(&self) -> Option<Post> {
        self.cache.peek(self.key()).and_then(CacheValue::into_post)
    }

    /// Form values bound to the cached post; `None` until it has loaded.
    pub fn form(&self) -> Option<PostForm> {
        self.post().as_ref().map(PostForm::from_post)
    }

    /// Send the whole form to the server.
    ///
    /// On success the posts queries are invalidated and the confirmation
    /// message is shown. On failure the error message is shown and the cache
    /// is left untouched.
    #[instrument(skip(self, form), fields(post_id = self.id))]
    pub async fn submit(&self, form: PostForm) -> Result<ViewUpdate<Post>, ViewError> {
        {
            let mut state = mutex_lock(&self.state, SOURCE, "submit.begin");
            state.updating = true;
            state.flash = None;
        }

        let result = self.gateway.update_post(self.id, &form.to_patch()).await;
        mutex_lock(&self.state, SOURCE, "submit.end").updating = false;

        match result {
            Ok(post) => {
                let marked = self.cache.invalidate(QueryKey::Posts);
                info!(marked, "Post saved");
                if !self.mounted.get() {
                    return Ok(ViewUpdate::Discarded);
                }
                self.show_flash(Flash::success(SAVED_MESSAGE));
                Ok(ViewUpdate::Applied(post))
            }
            Err(error) => {
                warn!(error = %error, error_kind = error.kind(), "Post update rejected");
                if !self.mounted.get() {
                    return Ok(ViewUpdate::Discarded);
                }
                self.show_flash(Flash::error(format!("Could not save post: {error}")));
                Err(error.into())
            }
        }
    }

    pub fn is_updating(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_updating").updating
    }

    pub fn is_loading(&self) -> bool {
        self.cache.status(self.key()) == EntryStatus::Loading && self.post().is_none()
    }

    pub fn flash(&self) -> Option<Flash> {
        mutex_lock(&self.state, SOURCE, "flash").flash.clone()
    }

    pub fn dismiss_flash(&self) {
        mutex_lock(&self.state, SOURCE, "dismiss_flash").flash = None;
    }

    pub fn render(&self) -> Result<String, ViewError> {
        let post = self
            .post()
            .ok_or(ViewError::MissingData { key: self.key() })?;
        let form = PostForm::from_post(&post);
        let content = AdminPostEditorView::new(
            &post,
            &form,
            self.is_updating(),
            self.flash().as_ref().map(AdminFlashView::from),
        );

        let template = AdminPostEditTemplate {
            view: AdminLayout::new(format!("Edit {}", post.title), content),
        };
        Ok(template.render()?)
    }

    /// Stop applying async results to this view and drop the post's cache
    /// entry. A fetch still in flight resolves without recreating it.
    pub fn unmount(&self) {
        self.mounted.unmount();
        self.cache.remove(self.key());
        debug!(post_id = self.id, "Post editor unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    fn show_flash(&self, flash: Flash) {
        mutex_lock(&self.state, SOURCE, "show_flash").flash = Some(flash);
    }

    fn post_fetcher(&self) -> Fetcher {
        let gateway = Arc::clone(&self.gateway);
        let id = self.id;
        fetcher(move |_current: Option<CacheValue>| {
            let gateway = Arc::clone(&gateway);
            async move { gateway.load_post(id).await.map(CacheValue::Post) }
        })
    }
}
