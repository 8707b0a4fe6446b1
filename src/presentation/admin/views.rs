pub mod flash;
pub mod posts;

pub use flash::AdminFlashView;
pub use posts::{
    AdminPostEditTemplate, AdminPostEditorView, AdminPostListTemplate, AdminPostListView,
    AdminPostRowView,
};

#[derive(Clone)]
pub struct AdminMetaView {
    pub title: String,
}

/// Page shell shared by every admin screen.
#[derive(Clone)]
pub struct AdminLayout<T> {
    pub meta: AdminMetaView,
    pub client_version: String,
    pub content: T,
}

impl<T> AdminLayout<T> {
    pub fn new(title: impl Into<String>, content: T) -> Self {
        Self {
            meta: AdminMetaView {
                title: title.into(),
            },
            client_version: client_version(),
            content,
        }
    }
}

fn client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
