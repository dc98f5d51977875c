//! Sequential comment fetching across a crawl's posts.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetcher::CommentTreeFetcher;
use crate::models::{CommentsByPost, Post};
use crate::pacing::Pacer;
use crate::source::CommentSource;

/// Drives the [`CommentTreeFetcher`] over posts one at a time.
pub struct BatchOrchestrator<'a> {
    source: &'a dyn CommentSource,
    fetcher: CommentTreeFetcher<'a>,
    pacer: Pacer,
    progress_every: usize,
    cancel: CancellationToken,
}

impl<'a> BatchOrchestrator<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn CommentSource,
        expand_more: bool,
        pacer: Pacer,
        progress_every: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            fetcher: CommentTreeFetcher::new(source, expand_more),
            pacer,
            progress_every: progress_every.max(1),
            cancel,
        }
    }

    /// Fetch the comment forest of every post with a usable locator.
    ///
    /// Posts are visited in the order given. Posts without a locator get no
    /// entry. Cancellation returns whatever has been fetched so far.
    pub async fn run(&self, posts: &[Post]) -> CommentsByPost {
        let mut comments = CommentsByPost::with_capacity(posts.len());
        let total = posts.len();
        let mut fetched_any = false;

        info!(posts = total, "Fetching comments");

        for (i, post) in posts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(done = i, total, "Comment fetching cancelled");
                break;
            }

            let Some(locator) = self.source.locator(post) else {
                debug!(post_id = %post.id, "Post has no comment locator, skipping");
                continue;
            };

            if fetched_any && !self.pacer.pause().await {
                warn!(done = i, total, "Comment fetching cancelled");
                break;
            }
            fetched_any = true;

            let forest = self.fetcher.fetch(&locator).await;
            debug!(
                post_id = %post.id,
                top_level = forest.len(),
                "Fetched comment forest"
            );
            comments.insert(post.id.clone(), forest);

            if (i + 1) % self.progress_every == 0 {
                info!(done = i + 1, total, "Processed posts for comments");
            }
        }

        comments
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::config::DelayRange;

    /// Serves a one-comment thread for every locator except `"broken"`.
    #[derive(Default)]
    struct FakeThreads {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommentSource for FakeThreads {
        fn locator(&self, post: &Post) -> Option<String> {
            post.permalink.clone()
        }

        async fn fetch_thread(&self, locator: &str) -> Option<Value> {
            self.requested.lock().unwrap().push(locator.to_string());
            if locator == "broken" {
                return None;
            }
            Some(json!([
                {"kind": "Listing", "data": {"children": []}},
                {"kind": "Listing", "data": {"children": [
                    {"kind": "t1", "data": {"name": format!("t1_{locator}"), "body": locator}}
                ]}}
            ]))
        }

        async fn fetch_more(&self, _link: &str, _children: &[String]) -> Option<Value> {
            None
        }

        async fn fetch_subtree(&self, _locator: &str, _comment_id: &str) -> Option<Value> {
            None
        }
    }

    fn post(id: &str, permalink: Option<&str>) -> Post {
        Post::from_thing(&json!({"data": {"id": id, "permalink": permalink}}))
    }

    fn orchestrator<'a>(source: &'a FakeThreads, cancel: CancellationToken) -> BatchOrchestrator<'a> {
        BatchOrchestrator::new(
            source,
            false,
            Pacer::new(DelayRange::zero(), cancel.clone()),
            2,
            cancel,
        )
    }

    #[tokio::test]
    async fn test_runs_in_order_and_skips_unlocatable_posts() {
        let source = FakeThreads::default();
        let posts = vec![
            post("a", Some("/a/")),
            post("b", None),
            post("c", Some("/c/")),
        ];

        let comments = orchestrator(&source, CancellationToken::new()).run(&posts).await;

        assert_eq!(*source.requested.lock().unwrap(), vec!["/a/", "/c/"]);
        assert_eq!(comments.len(), 2);
        assert!(!comments.contains_key("b"));
        assert_eq!(comments["c"][0].content, "/c/");
    }

    #[tokio::test]
    async fn test_failed_post_gets_empty_forest() {
        let source = FakeThreads::default();
        let posts = vec![post("a", Some("broken")), post("b", Some("/b/"))];

        let comments = orchestrator(&source, CancellationToken::new()).run(&posts).await;

        assert!(comments["a"].is_empty());
        assert_eq!(comments["b"].len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_fetches_nothing() {
        let source = FakeThreads::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let comments = orchestrator(&source, cancel)
            .run(&[post("a", Some("/a/"))])
            .await;

        assert!(comments.is_empty());
        assert!(source.requested.lock().unwrap().is_empty());
    }
}
