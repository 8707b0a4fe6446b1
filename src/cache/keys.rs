//! Query key definitions.
//!
//! A `QueryKey` names one cached result set. Keys compare by equality only;
//! `matches` gives the prefix semantics used when invalidating.

use std::fmt;

/// Identifies a cached query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The paged post collection, `["posts"]`.
    Posts,
    /// A single post, `["posts", id]`.
    Post(i64),
}

impl QueryKey {
    /// Whether this key falls under `filter` when the filter is treated as a prefix.
    ///
    /// `Posts` matches every key (the collection and each single post);
    /// `Post(id)` matches only itself.
    pub fn matches(&self, filter: &QueryKey) -> bool {
        match filter {
            QueryKey::Posts => true,
            QueryKey::Post(_) => self == filter,
        }
    }

    /// Low-cardinality label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            QueryKey::Posts => "posts",
            QueryKey::Post(_) => "post",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Posts => f.write_str(r#"["posts"]"#),
            QueryKey::Post(id) => write!(f, r#"["posts", {id}]"#),
        }
    }
}
