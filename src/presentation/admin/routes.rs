//! Admin client routes.
//!
//! `/` shows the posts list; `/posts/{id}` shows the edit form for one post.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PostsList,
    PostEdit { id: i64 },
}

impl Route {
    /// Match a path against the known routes. Trailing slashes and a query
    /// string are ignored.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');

        if trimmed.is_empty() {
            return Some(Route::PostsList);
        }

        let mut segments = trimmed.strip_prefix('/')?.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some("posts"), Some(id), None) => id.parse().ok().map(|id| Route::PostEdit { id }),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::PostsList => "/".to_string(),
            Route::PostEdit { id } => format!("/posts/{id}"),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_the_list() {
        assert_eq!(Route::parse("/"), Some(Route::PostsList));
        assert_eq!(Route::parse(""), Some(Route::PostsList));
    }

    #[test]
    fn post_path_carries_the_id() {
        assert_eq!(Route::parse("/posts/5"), Some(Route::PostEdit { id: 5 }));
        assert_eq!(Route::parse("/posts/5/"), Some(Route::PostEdit { id: 5 }));
        assert_eq!(
            Route::parse("/posts/12?tab=content"),
            Some(Route::PostEdit { id: 12 })
        );
    }

    #[test]
    fn unknown_paths_do_not_match() {
        assert_eq!(Route::parse("/posts"), None);
        assert_eq!(Route::parse("/posts/abc"), None);
        assert_eq!(Route::parse("/posts/5/comments"), None);
        assert_eq!(Route::parse("/tags/1"), None);
        assert_eq!(Route::parse("posts/5"), None);
    }

    #[test]
    fn path_round_trips() {
        for route in [Route::PostsList, Route::PostEdit { id: 42 }] {
            assert_eq!(Route::parse(&route.path()), Some(route));
        }
    }
}
