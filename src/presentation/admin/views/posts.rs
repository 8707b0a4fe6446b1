use askama::Template;

use crate::{
    application::admin::posts::{PostForm, PostRow, RowMode},
    domain::posts::{Post, format_full_date},
    presentation::admin::routes::Route,
};

use super::{AdminFlashView, AdminLayout};

#[derive(Clone)]
pub struct AdminPostRowView {
    pub id: i64,
    pub title: String,
    pub status_key: &'static str,
    pub is_published: bool,
    pub display_date: String,
    pub edit_href: String,
    pub is_editing: bool,
    pub is_saving: bool,
}

impl From<&PostRow> for AdminPostRowView {
    fn from(row: &PostRow) -> Self {
        let post = &row.post;
        Self {
            id: post.id,
            title: post.title.clone(),
            status_key: post.status.as_str(),
            is_published: post.status.is_published(),
            display_date: format_full_date(post.date_created),
            edit_href: Route::PostEdit { id: post.id }.path(),
            is_editing: row.mode == RowMode::Edit,
            is_saving: row.mode == RowMode::Saving,
        }
    }
}

#[derive(Clone)]
pub struct AdminPostListView {
    pub heading: String,
    pub posts: Vec<AdminPostRowView>,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub next_page: u32,
    pub error: Option<AdminFlashView>,
    pub empty_message: String,
}

impl AdminPostListView {
    pub fn has_posts(&self) -> bool {
        !self.posts.is_empty()
    }
}

#[derive(Template)]
#[template(path = "admin/posts.html")]
pub struct AdminPostListTemplate {
    pub view: AdminLayout<AdminPostListView>,
}

#[derive(Clone)]
pub struct AdminPostEditorView {
    pub heading: String,
    pub id: i64,
    pub form_action: String,
    pub back_href: String,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub display_date: String,
    pub is_updating: bool,
    pub flash: Option<AdminFlashView>,
}

impl AdminPostEditorView {
    pub fn new(
        post: &Post,
        form: &PostForm,
        is_updating: bool,
        flash: Option<AdminFlashView>,
    ) -> Self {
        let href = Route::PostEdit { id: post.id }.path();
        Self {
            heading: format!("Edit post #{}", post.id),
            id: post.id,
            form_action: href,
            back_href: Route::PostsList.path(),
            title: form.title.clone(),
            content: form.content.clone(),
            published: form.published,
            display_date: format_full_date(post.date_created),
            is_updating,
            flash,
        }
    }
}

#[derive(Template)]
#[template(path = "admin/post_edit.html")]
pub struct AdminPostEditTemplate {
    pub view: AdminLayout<AdminPostEditorView>,
}
