//! Upstream collaborators for listings and comment threads.
//!
//! Crawling and comment reconstruction are written once against these traits;
//! selecting a harvest mode only swaps the implementation.

pub mod api;
pub mod public;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use api::ApiSource;
pub use public::PublicSource;

use crate::config::{Config, HarvestMode};
use crate::gateway::{
    BearerIdentity, HttpTransport, RequestGateway, ReqwestTransport, RotatingUserAgent,
};
use crate::models::{ListingPage, Post};

/// Newest-first listing of a source's posts.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch one page of at most `limit` posts after the `after` cursor.
    ///
    /// Returns `None` if the page could not be retrieved or decoded.
    async fn fetch_page(
        &self,
        source_name: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Option<ListingPage>;
}

/// Comment threads for individual posts.
///
/// Thread payloads are returned raw (`[submission listing, comment listing]`)
/// and decoded by the comment tree builder.
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// How this source addresses a post's comments, if it can.
    fn locator(&self, post: &Post) -> Option<String>;

    /// Fetch the full thread for a post locator.
    async fn fetch_thread(&self, locator: &str) -> Option<Value>;

    /// Resolve "load more" child ids. Returns the flat `things` array.
    async fn fetch_more(&self, link_fullname: &str, children: &[String]) -> Option<Value>;

    /// Fetch a thread focused on one comment, for "continue this thread" nodes.
    async fn fetch_subtree(&self, locator: &str, comment_id: &str) -> Option<Value>;
}

/// Build the post and comment sources for the configured mode.
///
/// Both trait objects share one gateway so they present a single request rate.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the credentials are
/// not valid header values.
pub fn from_config(
    config: &Config,
    cancel: CancellationToken,
) -> Result<(Arc<dyn PostSource>, Arc<dyn CommentSource>)> {
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.retry.request_timeout)?);

    match config.mode {
        HarvestMode::Public => {
            let gateway = RequestGateway::new(
                transport,
                Arc::new(RotatingUserAgent::browsers()),
                config.retry,
                cancel,
            );
            let source = Arc::new(PublicSource::new(gateway, &config.public_base_url));
            let posts: Arc<dyn PostSource> = source.clone();
            let comments: Arc<dyn CommentSource> = source;
            Ok((posts, comments))
        }
        HarvestMode::Api => {
            let token = config
                .access_token
                .as_deref()
                .context("REDDIT_ACCESS_TOKEN is required in api mode")?;
            let identity = BearerIdentity::new(&config.api_user_agent, token)
                .context("Invalid API credentials")?;
            let gateway =
                RequestGateway::new(transport, Arc::new(identity), config.retry, cancel);
            let source = Arc::new(ApiSource::new(gateway, &config.api_base_url));
            let posts: Arc<dyn PostSource> = source.clone();
            let comments: Arc<dyn CommentSource> = source;
            Ok((posts, comments))
        }
    }
}

/// Extract `json.data.things` from a morechildren response.
pub(crate) fn morechildren_things(response: Value) -> Option<Value> {
    match response {
        Value::Object(mut root) => match root.remove("json")? {
            Value::Object(mut json) => match json.remove("data")? {
                Value::Object(mut data) => data.remove("things"),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
