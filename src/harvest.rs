//! End-to-end harvest: crawl posts, fetch their comments, merge, archive.

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::{combine_posts_comments, manifest_path, ArchiveWriter};
use crate::comments::BatchOrchestrator;
use crate::config::Config;
use crate::crawler::{PostCrawler, StopReason};
use crate::models::Manifest;
use crate::pacing::Pacer;
use crate::source::{self, CommentSource, PostSource};

/// Summary of a harvest that produced an archive.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub posts: usize,
    /// Posts whose comment forest is non-empty.
    pub posts_with_comments: usize,
    pub stop_reason: StopReason,
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum HarvestOutcome {
    /// The crawl found nothing; no comments were fetched and nothing was written.
    NoPosts,
    Archived(HarvestReport),
}

pub struct Harvester {
    config: Config,
    cancel: CancellationToken,
}

impl Harvester {
    #[must_use]
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Run the harvest against the sources selected by the configured mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be built or the archive cannot
    /// be written. Upstream failures never surface here.
    pub async fn run(&self) -> Result<HarvestOutcome> {
        let (posts, comments) = source::from_config(&self.config, self.cancel.clone())?;
        self.run_with(posts.as_ref(), comments.as_ref()).await
    }

    /// Run the harvest against explicit sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written.
    pub async fn run_with(
        &self,
        post_source: &dyn PostSource,
        comment_source: &dyn CommentSource,
    ) -> Result<HarvestOutcome> {
        let config = &self.config;

        let crawler = PostCrawler::new(
            post_source,
            config.page_size,
            Pacer::new(config.page_delay, self.cancel.clone()),
            self.cancel.clone(),
        );
        let crawl = crawler.crawl(&config.source_name, config.start_year).await;

        if crawl.posts.is_empty() {
            warn!(source = %config.source_name, stop_reason = %crawl.stop_reason, "No posts found");
            return Ok(HarvestOutcome::NoPosts);
        }
        info!(source = %config.source_name, posts = crawl.posts.len(), "Total posts fetched");

        let orchestrator = BatchOrchestrator::new(
            comment_source,
            config.expand_more,
            Pacer::new(config.post_delay, self.cancel.clone()),
            config.progress_every,
            self.cancel.clone(),
        );
        let comments = orchestrator.run(&crawl.posts).await;

        let posts = crawl.posts.len();
        let posts_with_comments = comments.values().filter(|f| !f.is_empty()).count();
        if self.cancel.is_cancelled() {
            warn!(
                posts,
                fetched = comments.len(),
                "Harvest cancelled, archiving what was collected"
            );
        }

        let records = combine_posts_comments(crawl.posts, comments);
        let writer = ArchiveWriter::new(config.archive);
        let manifest = writer
            .write(&records, &config.output_dir, &config.source_name)
            .await?;

        Ok(HarvestOutcome::Archived(HarvestReport {
            posts,
            posts_with_comments,
            stop_reason: crawl.stop_reason,
            manifest,
            manifest_path: manifest_path(&config.output_dir, &config.source_name),
        }))
    }
}
