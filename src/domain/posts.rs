//! Post collections as held by the admin client.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

pub use postdesk_api_types::{NewPost, Post, PostPage, PostPatch, PostStatus};

/// Long-form creation date shown in the list, e.g. `Thursday, March 4, 2021`.
pub const FULL_DATE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[weekday repr:long], [month repr:long] [day padding:none], [year]"
);

pub fn format_full_date(value: OffsetDateTime) -> String {
    value
        .format(FULL_DATE_FORMAT)
        .unwrap_or_else(|_| value.date().to_string())
}

/// Pages of posts accumulated by the list, in fetch order.
///
/// Page `n` (1-based) always sits at index `n - 1`, so the next page to load is
/// derived from how many pages are held rather than tracked separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPages {
    pages: Vec<PostPage>,
}

impl PostPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pages(pages: Vec<PostPage>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[PostPage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based number of the page that follows the ones already held.
    pub fn next_page(&self) -> u32 {
        u32::try_from(self.pages.len() + 1).unwrap_or(u32::MAX)
    }

    pub fn append(&mut self, page: PostPage) {
        self.pages.push(page);
    }

    pub fn appended(&self, page: PostPage) -> Self {
        let mut next = self.clone();
        next.append(page);
        next
    }

    /// All posts in page order.
    pub fn flatten(&self) -> Vec<Post> {
        self.pages.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: i64) -> Option<&Post> {
        self.pages.iter().flatten().find(|post| post.id == id)
    }

    /// Copy of the collection with the title of post `id` replaced.
    pub fn with_title(&self, id: i64, title: &str) -> Self {
        let pages = self
            .pages
            .iter()
            .map(|page| {
                page.iter()
                    .map(|post| {
                        if post.id == id {
                            Post {
                                title: title.to_string(),
                                ..post.clone()
                            }
                        } else {
                            post.clone()
                        }
                    })
                    .collect()
            })
            .collect();
        Self { pages }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            title: title.to_string(),
            content: format!("content {id}"),
            status: PostStatus::Draft,
            date_created: datetime!(2021-03-04 10:00 UTC),
        }
    }

    #[test]
    fn next_page_follows_held_pages() {
        let mut pages = PostPages::new();
        assert_eq!(pages.next_page(), 1);
        pages.append(vec![post(1, "a"), post(2, "b")]);
        assert_eq!(pages.next_page(), 2);
        pages.append(vec![post(3, "c")]);
        assert_eq!(pages.next_page(), 3);
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn flatten_keeps_page_then_row_order() {
        let pages = PostPages::from_pages(vec![vec![post(2, "b"), post(1, "a")], vec![post(9, "z")]]);
        let ids: Vec<i64> = pages.flatten().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1, 9]);
    }

    #[test]
    fn with_title_touches_only_matching_post() {
        let pages = PostPages::from_pages(vec![vec![post(4, "four"), post(5, "Old Title")]]);
        let updated = pages.with_title(5, "New Title");

        assert_eq!(updated.find(5).map(|p| p.title.as_str()), Some("New Title"));
        assert_eq!(updated.find(4), pages.find(4));
        assert_eq!(
            updated.find(5).map(|p| &p.content),
            pages.find(5).map(|p| &p.content)
        );
        // source value is untouched
        assert_eq!(pages.find(5).map(|p| p.title.as_str()), Some("Old Title"));
    }

    #[test]
    fn full_date_is_long_form() {
        assert_eq!(
            format_full_date(datetime!(2021-03-04 10:00 UTC)),
            "Thursday, March 4, 2021"
        );
    }
}
