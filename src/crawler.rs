//! Newest-first listing crawl bounded by a start-year cutoff.

use std::collections::HashSet;
use std::fmt;

use chrono::{Local, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::LISTING_DEPTH_CEILING;
use crate::models::Post;
use crate::pacing::Pacer;
use crate::source::PostSource;

/// Why a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A post older than the cutoff was reached.
    Cutoff,
    /// The listing ran out while every post seen was still inside the
    /// cutoff, so older matching posts exist beyond the listing ceiling.
    UpstreamCeiling,
    /// The listing ran out before yielding any post.
    Exhausted,
    /// The harvest was cancelled.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cutoff => "cutoff",
            Self::UpstreamCeiling => "upstream_ceiling",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Posts in listing order (newest first).
    pub posts: Vec<Post>,
    pub stop_reason: StopReason,
    pub pages: usize,
}

/// Unix timestamp of midnight, January 1st of `year`, in local time.
///
/// Falls back to UTC midnight if the local midnight does not exist.
#[must_use]
pub fn cutoff_timestamp(year: i32) -> i64 {
    Local
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .earliest()
        .map(|dt| dt.timestamp())
        .or_else(|| {
            Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
                .single()
                .map(|dt| dt.timestamp())
        })
        .unwrap_or(0)
}

pub struct PostCrawler<'a> {
    source: &'a dyn PostSource,
    page_size: u32,
    pacer: Pacer,
    cancel: CancellationToken,
}

impl<'a> PostCrawler<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn PostSource,
        page_size: u32,
        pacer: Pacer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            page_size,
            pacer,
            cancel,
        }
    }

    /// Crawl `source_name` newest-first down to January 1st of `start_year`.
    pub async fn crawl(&self, source_name: &str, start_year: i32) -> CrawlOutcome {
        let outcome = self
            .crawl_until(source_name, cutoff_timestamp(start_year))
            .await;

        if outcome.stop_reason == StopReason::UpstreamCeiling {
            warn!(
                source = %source_name,
                start_year,
                posts = outcome.posts.len(),
                ceiling = LISTING_DEPTH_CEILING,
                "Listing ended before reaching the start year; older posts are beyond the upstream listing limit and were NOT fetched"
            );
        }
        outcome
    }

    /// Crawl until a post created before `cutoff` (unix seconds) is seen.
    pub async fn crawl_until(&self, source_name: &str, cutoff: i64) -> CrawlOutcome {
        let cutoff_secs = cutoff as f64;
        let mut posts: Vec<Post> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        info!(source = %source_name, cutoff, "Fetching posts (newest first)");

        let stop_reason = 'pages: loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let Some(page) = self
                .source
                .fetch_page(source_name, self.page_size, after.as_deref())
                .await
            else {
                if self.cancel.is_cancelled() {
                    break StopReason::Cancelled;
                }
                warn!(source = %source_name, pages, "No data returned or invalid format");
                break ended_without_cutoff(&posts, cutoff_secs);
            };
            pages += 1;

            if page.posts.is_empty() {
                debug!(source = %source_name, pages, "Empty page, listing exhausted");
                break ended_without_cutoff(&posts, cutoff_secs);
            }

            for post in page.posts {
                if post.created_utc < cutoff_secs {
                    info!(
                        source = %source_name,
                        post_id = %post.id,
                        created_utc = post.created_utc,
                        "Reached posts older than the cutoff, stopping"
                    );
                    break 'pages StopReason::Cutoff;
                }
                if post.id.is_empty() {
                    warn!(source = %source_name, "Skipping listing item without an id");
                    continue;
                }
                if !seen.insert(post.id.clone()) {
                    debug!(post_id = %post.id, "Skipping post repeated across pages");
                    continue;
                }
                posts.push(post);
            }

            let Some(next) = page.after else {
                debug!(source = %source_name, pages, "No next-page cursor, listing exhausted");
                break ended_without_cutoff(&posts, cutoff_secs);
            };
            after = Some(next);

            info!(source = %source_name, posts = posts.len(), "Fetched posts so far");

            if !self.pacer.pause().await {
                break StopReason::Cancelled;
            }
        };

        info!(
            source = %source_name,
            posts = posts.len(),
            pages,
            stop_reason = %stop_reason,
            "Post crawl finished"
        );

        CrawlOutcome {
            posts,
            stop_reason,
            pages,
        }
    }
}

fn ended_without_cutoff(posts: &[Post], cutoff_secs: f64) -> StopReason {
    match posts.last() {
        Some(last) if last.created_utc >= cutoff_secs => StopReason::UpstreamCeiling,
        _ => StopReason::Exhausted,
    }
}
