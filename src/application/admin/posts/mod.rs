mod edit;
mod list;
pub mod types;

pub use edit::PostEditView;
pub use list::PostsListView;
pub use types::{
    Flash, FlashKind, NextPage, PostForm, PostRow, RowMode, SAVED_MESSAGE, ViewError, ViewUpdate,
};
