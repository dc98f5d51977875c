//! Fetch one post's comment thread and rebuild it as a forest.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::tree::{CommentArena, Placeholder};
use crate::constants::MORECHILDREN_BATCH;
use crate::models::{str_field, CommentForest};
use crate::source::CommentSource;

/// Turns a post locator into a comment forest.
///
/// With `expand_more` set, every "load more" placeholder is resolved before
/// the forest is built; otherwise placeholders are dropped.
pub struct CommentTreeFetcher<'a> {
    source: &'a dyn CommentSource,
    expand_more: bool,
}

impl<'a> CommentTreeFetcher<'a> {
    #[must_use]
    pub fn new(source: &'a dyn CommentSource, expand_more: bool) -> Self {
        Self {
            source,
            expand_more,
        }
    }

    /// Fetch the forest for `locator`. Any failure yields an empty forest.
    pub async fn fetch(&self, locator: &str) -> CommentForest {
        let Some(thread) = self.source.fetch_thread(locator).await else {
            error!(locator = %locator, "Error fetching comments: no response");
            return CommentForest::new();
        };

        let Some((link_fullname, listing)) = split_thread(&thread) else {
            error!(locator = %locator, "Error fetching comments: unexpected thread shape");
            return CommentForest::new();
        };

        let mut arena = CommentArena::from_listing(listing);

        if self.expand_more {
            match link_fullname {
                Some(link) => self.expand(locator, &link, &mut arena).await,
                None => warn!(
                    locator = %locator,
                    "Thread has no submission fullname, cannot expand placeholders"
                ),
            }
        }

        let built = arena.into_forest();
        if built.dropped_placeholders > 0 {
            debug!(
                locator = %locator,
                dropped = built.dropped_placeholders,
                "Dropped unexpanded \"load more\" placeholders"
            );
        }
        built.comments
    }

    /// Resolve placeholders until none remain. Each placeholder is tried once.
    async fn expand(&self, locator: &str, link_fullname: &str, arena: &mut CommentArena) {
        let mut attempted: HashSet<String> = HashSet::new();
        let mut failed = 0usize;
        let mut requests = 0usize;

        loop {
            let pending = arena.placeholders();
            if pending.is_empty() {
                break;
            }

            for index in pending {
                let Some(placeholder) = arena.placeholder(index).cloned() else {
                    continue;
                };
                if !attempted.insert(placeholder.key()) {
                    debug!(parent = %placeholder.parent_fullname, "Placeholder repeated, discarding");
                    arena.discard(index);
                    continue;
                }

                let (things, calls) = self.resolve(locator, link_fullname, &placeholder).await;
                requests += calls;
                match things {
                    Some(things) => {
                        let added = arena.resolve(index, &things);
                        debug!(
                            parent = %placeholder.parent_fullname,
                            expected = placeholder.count,
                            added,
                            "Expanded placeholder"
                        );
                    }
                    None => {
                        failed += 1;
                        arena.discard(index);
                    }
                }
            }
        }

        if failed > 0 {
            warn!(
                locator = %locator,
                failed,
                requests,
                "Some \"load more\" placeholders could not be resolved"
            );
        }
    }

    /// Fetch the comments hidden behind one placeholder.
    ///
    /// Returns the things (if any request succeeded) and the request count.
    async fn resolve(
        &self,
        locator: &str,
        link_fullname: &str,
        placeholder: &Placeholder,
    ) -> (Option<Vec<Value>>, usize) {
        if placeholder.is_continuation() {
            let Some(comment_id) = placeholder.parent_fullname.strip_prefix("t1_") else {
                return (None, 0);
            };
            let things = self
                .source
                .fetch_subtree(locator, comment_id)
                .await
                .as_ref()
                .and_then(|thread| subtree_replies(thread, &placeholder.parent_fullname));
            return (things, 1);
        }

        let mut things = Vec::new();
        let mut any_ok = false;
        let mut calls = 0;
        for batch in placeholder.children.chunks(MORECHILDREN_BATCH) {
            calls += 1;
            match self.source.fetch_more(link_fullname, batch).await {
                Some(Value::Array(batch_things)) => {
                    any_ok = true;
                    things.extend(batch_things);
                }
                Some(_) | None => {
                    warn!(
                        parent = %placeholder.parent_fullname,
                        ids = batch.len(),
                        "Failed to resolve \"load more\" batch"
                    );
                }
            }
        }
        (any_ok.then_some(things), calls)
    }
}

/// Split a thread response into the submission fullname and the comment listing.
fn split_thread(thread: &Value) -> Option<(Option<String>, &Value)> {
    let parts = thread.as_array()?;
    if parts.len() < 2 {
        return None;
    }
    let link_fullname = parts[0]
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|t| t.get("data"))
        .and_then(|d| str_field(d, "name"));
    Some((link_fullname, &parts[1]))
}

/// Replies of `parent_fullname` inside a thread focused on that comment.
fn subtree_replies(thread: &Value, parent_fullname: &str) -> Option<Vec<Value>> {
    let (_, listing) = split_thread(thread)?;
    let focus = listing
        .get("data")?
        .get("children")?
        .as_array()?
        .iter()
        .find(|t| t.get("data").and_then(|d| str_field(d, "name")).as_deref() == Some(parent_fullname))?;

    let replies = focus
        .get("data")?
        .get("replies")
        .and_then(|r| r.get("data"))
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Some(replies)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::models::{Comment, Post};

    fn comment(id: &str, parent: &str, replies: Value) -> Value {
        json!({"kind": "t1", "data": {
            "id": id,
            "name": format!("t1_{id}"),
            "parent_id": parent,
            "author": format!("author_{id}"),
            "body": id,
            "created_utc": 1_700_000_000.0,
            "score": 3,
            "replies": replies
        }})
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children}})
    }

    fn more(parent: &str, children: &[&str]) -> Value {
        json!({"kind": "more", "data": {
            "id": children.first().copied().unwrap_or("_"),
            "parent_id": parent,
            "children": children,
            "count": children.len()
        }})
    }

    fn thread(comments: Vec<Value>) -> Value {
        json!([
            listing(vec![json!({"kind": "t3", "data": {"id": "p", "name": "t3_p"}})]),
            listing(comments)
        ])
    }

    /// In-memory comment source keyed by locator / first child id.
    #[derive(Default)]
    struct FakeComments {
        threads: HashMap<String, Value>,
        more: HashMap<String, Value>,
        subtrees: HashMap<String, Value>,
        more_calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommentSource for FakeComments {
        fn locator(&self, post: &Post) -> Option<String> {
            post.permalink.clone()
        }

        async fn fetch_thread(&self, locator: &str) -> Option<Value> {
            self.threads.get(locator).cloned()
        }

        async fn fetch_more(&self, _link: &str, children: &[String]) -> Option<Value> {
            self.more_calls.lock().unwrap().push(children.to_vec());
            self.more.get(children.first()?).cloned()
        }

        async fn fetch_subtree(&self, _locator: &str, comment_id: &str) -> Option<Value> {
            self.subtrees.get(comment_id).cloned()
        }
    }

    fn bodies(forest: &[Comment]) -> Vec<&str> {
        forest.iter().map(|c| c.content.as_str()).collect()
    }

    fn count_all(forest: &[Comment]) -> usize {
        forest.iter().map(Comment::subtree_len).sum()
    }

    #[tokio::test]
    async fn test_missing_thread_yields_empty_forest() {
        let source = FakeComments::default();
        let forest = CommentTreeFetcher::new(&source, true).fetch("/r/x/comments/p/").await;
        assert!(forest.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_thread_yields_empty_forest() {
        let mut source = FakeComments::default();
        source.threads.insert("loc".to_string(), json!({"error": 404}));
        let forest = CommentTreeFetcher::new(&source, false).fetch("loc").await;
        assert!(forest.is_empty());
    }

    #[tokio::test]
    async fn test_placeholders_dropped_without_expansion() {
        let mut source = FakeComments::default();
        source.threads.insert(
            "loc".to_string(),
            thread(vec![comment("a", "t3_p", json!("")), more("t3_p", &["b"])]),
        );
        source
            .more
            .insert("b".to_string(), json!([comment("b", "t3_p", json!(""))]));

        let forest = CommentTreeFetcher::new(&source, false).fetch("loc").await;

        assert_eq!(bodies(&forest), vec!["a"]);
        assert!(source.more_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_placeholders_fully_expanded() {
        // Three levels: each resolution reveals another placeholder one level down.
        let mut source = FakeComments::default();
        source.threads.insert(
            "loc".to_string(),
            thread(vec![comment("a", "t3_p", json!("")), more("t3_p", &["b"])]),
        );
        source.more.insert(
            "b".to_string(),
            json!([comment("b", "t3_p", json!("")), more("t1_b", &["c"])]),
        );
        source.more.insert(
            "c".to_string(),
            json!([comment("c", "t1_b", json!("")), more("t1_c", &["d", "e"])]),
        );
        source.more.insert(
            "d".to_string(),
            json!([comment("d", "t1_c", json!("")), comment("e", "t1_c", json!(""))]),
        );

        let forest = CommentTreeFetcher::new(&source, true).fetch("loc").await;

        assert_eq!(bodies(&forest), vec!["a", "b"]);
        assert_eq!(bodies(&forest[1].replies), vec!["c"]);
        assert_eq!(bodies(&forest[1].replies[0].replies), vec!["d", "e"]);
        assert_eq!(count_all(&forest), 5);
        assert_eq!(source.more_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_continue_thread_resolved_from_subtree() {
        let mut source = FakeComments::default();
        source.threads.insert(
            "loc".to_string(),
            thread(vec![comment(
                "a",
                "t3_p",
                listing(vec![more("t1_a", &[])]),
            )]),
        );
        source.subtrees.insert(
            "a".to_string(),
            thread(vec![comment(
                "a",
                "t3_p",
                listing(vec![comment(
                    "a1",
                    "t1_a",
                    listing(vec![comment("a1x", "t1_a1", json!(""))]),
                )]),
            )]),
        );

        let forest = CommentTreeFetcher::new(&source, true).fetch("loc").await;

        assert_eq!(bodies(&forest[0].replies), vec!["a1"]);
        assert_eq!(bodies(&forest[0].replies[0].replies), vec!["a1x"]);
    }

    #[tokio::test]
    async fn test_failed_resolution_drops_placeholder_only() {
        let mut source = FakeComments::default();
        source.threads.insert(
            "loc".to_string(),
            thread(vec![comment("a", "t3_p", json!("")), more("t3_p", &["zz"])]),
        );

        let forest = CommentTreeFetcher::new(&source, true).fetch("loc").await;

        assert_eq!(bodies(&forest), vec!["a"]);
        assert_eq!(source.more_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_placeholder_is_not_refetched() {
        let mut source = FakeComments::default();
        source.threads.insert(
            "loc".to_string(),
            thread(vec![more("t3_p", &["a"])]),
        );
        // Upstream keeps answering with the same placeholder.
        source.more.insert(
            "a".to_string(),
            json!([comment("a", "t3_p", json!("")), more("t3_p", &["a"])]),
        );

        let forest = CommentTreeFetcher::new(&source, true).fetch("loc").await;

        assert_eq!(bodies(&forest), vec!["a"]);
        assert_eq!(source.more_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_thread_survives_transient_transport_faults() {
        use std::sync::Arc;

        use tokio_util::sync::CancellationToken;

        use crate::config::RetryPolicy;
        use crate::gateway::tests::{ok, ScriptedTransport};
        use crate::gateway::{RequestGateway, RotatingUserAgent, TransportError};
        use crate::source::PublicSource;

        let body = thread(vec![comment("a", "t3_p", json!(""))]).to_string();
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connect("connection reset".to_string())),
            ok(&body),
        ]));
        let gateway = RequestGateway::new(
            transport.clone(),
            Arc::new(RotatingUserAgent::browsers()),
            RetryPolicy {
                throttle_cooldown: std::time::Duration::ZERO,
                transport_backoff: std::time::Duration::ZERO,
                ..RetryPolicy::default()
            },
            CancellationToken::new(),
        );
        let source = PublicSource::new(gateway, "http://localhost");

        let forest = CommentTreeFetcher::new(&source, false)
            .fetch("/r/x/comments/p/t/")
            .await;

        assert_eq!(bodies(&forest), vec!["a"]);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_large_placeholder_is_batched() {
        let ids: Vec<String> = (0..150).map(|i| format!("c{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut source = FakeComments::default();
        source
            .threads
            .insert("loc".to_string(), thread(vec![more("t3_p", &id_refs)]));
        source.more.insert(
            "c0".to_string(),
            json!([comment("c0", "t3_p", json!(""))]),
        );
        source.more.insert(
            "c100".to_string(),
            json!([comment("c100", "t3_p", json!(""))]),
        );

        let forest = CommentTreeFetcher::new(&source, true).fetch("loc").await;

        let calls = source.more_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 100);
        assert_eq!(calls[1].len(), 50);
        assert_eq!(bodies(&forest), vec!["c0", "c100"]);
    }
}
