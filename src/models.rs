//! Records produced by a harvest and the decoders that build them from
//! upstream JSON.
//!
//! Upstream payloads are read field by field with explicit defaults, so a
//! missing or mistyped field degrades to its default instead of failing the
//! whole record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DELETED_AUTHOR;

/// A submission as it appears in a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_utc: f64,
    pub score: i64,
    pub url: String,
    pub num_comments: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
}

impl Post {
    /// Decode a listing child (`{"kind": "t3", "data": {...}}`).
    ///
    /// Also accepts a bare data object. An absent id decodes to an empty
    /// string; callers decide whether such a post is usable.
    #[must_use]
    pub fn from_thing(thing: &Value) -> Self {
        let data = thing.get("data").unwrap_or(thing);
        Self {
            id: str_field(data, "id").unwrap_or_default(),
            title: str_field(data, "title").unwrap_or_default(),
            content: str_field(data, "selftext").unwrap_or_default(),
            author: author_field(data),
            created_utc: f64_field(data, "created_utc"),
            score: i64_field(data, "score"),
            url: str_field(data, "url").unwrap_or_default(),
            num_comments: i64_field(data, "num_comments"),
            permalink: str_field(data, "permalink").filter(|p| !p.is_empty()),
        }
    }
}

/// A comment and its replies, in upstream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub content: String,
    pub created_utc: f64,
    pub score: i64,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Decode the scalar fields of a comment's data object. Replies are
    /// attached separately by the tree builder.
    #[must_use]
    pub fn from_data(data: &Value) -> Self {
        Self {
            author: author_field(data),
            content: str_field(data, "body").unwrap_or_default(),
            created_utc: f64_field(data, "created_utc"),
            score: i64_field(data, "score"),
            replies: Vec::new(),
        }
    }

    /// Number of comments in this subtree, including this one.
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(comment) = stack.pop() {
            total += 1;
            stack.extend(comment.replies.iter());
        }
        total
    }
}

/// Top-level comments of one post.
pub type CommentForest = Vec<Comment>;

/// Post id to that post's comment forest.
pub type CommentsByPost = HashMap<String, CommentForest>;

/// A post merged with its comment forest, as written to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    #[serde(flatten)]
    pub post: Post,
    pub comments: CommentForest,
}

/// Index of the chunk files written for one harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    /// Chunk file names relative to the manifest's directory, in write order.
    pub chunks: Vec<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub posts: Vec<Post>,
    /// Cursor for the next page; `None` when the listing is exhausted.
    pub after: Option<String>,
}

impl ListingPage {
    /// Decode a listing response (`{"kind": "Listing", "data": {"children": [...], "after": ...}}`).
    ///
    /// Returns `None` if the payload has no `data.children` array.
    #[must_use]
    pub fn from_json(listing: &Value) -> Option<Self> {
        let data = listing.get("data")?;
        let children = data.get("children")?.as_array()?;
        Some(Self {
            posts: children.iter().map(Post::from_thing).collect(),
            after: str_field(data, "after").filter(|a| !a.is_empty()),
        })
    }
}

pub(crate) fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(ToString::to_string)
}

/// Timestamps arrive as floats (`1704067200.0`) but tolerate integers.
pub(crate) fn f64_field(data: &Value, key: &str) -> f64 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn i64_field(data: &Value, key: &str) -> i64 {
    match data.get(key) {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        None => 0,
    }
}

fn author_field(data: &Value) -> String {
    str_field(data, "author")
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DELETED_AUTHOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_from_thing_fills_defaults() {
        let thing = json!({"kind": "t3", "data": {"id": "abc", "created_utc": 1_700_000_000.0}});
        let post = Post::from_thing(&thing);

        assert_eq!(post.id, "abc");
        assert_eq!(post.author, DELETED_AUTHOR);
        assert_eq!(post.content, "");
        assert_eq!(post.score, 0);
        assert_eq!(post.num_comments, 0);
        assert_eq!(post.permalink, None);
        assert!((post.created_utc - 1_700_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_post_from_thing_tolerates_wrong_types() {
        let thing = json!({"data": {
            "id": "x1",
            "author": null,
            "score": 12.0,
            "num_comments": "many",
            "created_utc": 1_700_000_000
        }});
        let post = Post::from_thing(&thing);

        assert_eq!(post.author, DELETED_AUTHOR);
        assert_eq!(post.score, 12);
        assert_eq!(post.num_comments, 0);
        assert!((post.created_utc - 1_700_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_listing_page_reads_cursor() {
        let listing = json!({"kind": "Listing", "data": {
            "after": "t3_next",
            "children": [{"kind": "t3", "data": {"id": "a"}}, {"kind": "t3", "data": {"id": "b"}}]
        }});
        let page = ListingPage::from_json(&listing).unwrap();

        assert_eq!(page.after.as_deref(), Some("t3_next"));
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[1].id, "b");

        let last = json!({"data": {"after": null, "children": []}});
        let page = ListingPage::from_json(&last).unwrap();
        assert!(page.after.is_none());
        assert!(page.posts.is_empty());

        assert!(ListingPage::from_json(&json!({"error": 403})).is_none());
    }

    #[test]
    fn test_combined_record_serializes_flat() {
        let record = CombinedRecord {
            post: Post::from_thing(&json!({"data": {"id": "p1", "title": "Hello"}})),
            comments: vec![Comment::from_data(&json!({"author": "u", "body": "hi"}))],
        };
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], "p1");
        assert_eq!(value["title"], "Hello");
        assert_eq!(value["comments"][0]["content"], "hi");
        assert!(value.get("permalink").is_none());
        assert!(value["comments"][0]["replies"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_subtree_len() {
        let mut root = Comment::from_data(&json!({"body": "root"}));
        let mut child = Comment::from_data(&json!({"body": "child"}));
        child.replies.push(Comment::from_data(&json!({"body": "grandchild"})));
        root.replies.push(child);
        root.replies.push(Comment::from_data(&json!({"body": "sibling"})));

        assert_eq!(root.subtree_len(), 4);
    }
}
