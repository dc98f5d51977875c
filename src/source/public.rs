//! Unauthenticated access through the public `.json` endpoints.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{morechildren_things, CommentSource, PostSource};
use crate::gateway::RequestGateway;
use crate::models::{ListingPage, Post};

/// Scrapes listings and threads from `https://www.reddit.com/...json`.
///
/// Comments are located by permalink.
pub struct PublicSource {
    gateway: RequestGateway,
    base_url: String,
}

impl PublicSource {
    #[must_use]
    pub fn new(gateway: RequestGateway, base_url: &str) -> Self {
        Self {
            gateway,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PostSource for PublicSource {
    async fn fetch_page(
        &self,
        source_name: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Option<ListingPage> {
        let url = format!("{}/r/{source_name}/new.json", self.base_url);
        let mut query = vec![("limit", limit.to_string()), ("raw_json", "1".to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self.gateway.request(&url, &query).await?;
        let page = ListingPage::from_json(&response);
        if page.is_none() {
            warn!(url = %url, "Listing response has no data.children, treating as end of listing");
        }
        page
    }
}

#[async_trait]
impl CommentSource for PublicSource {
    fn locator(&self, post: &Post) -> Option<String> {
        post.permalink.clone()
    }

    async fn fetch_thread(&self, locator: &str) -> Option<Value> {
        let url = format!("{}{locator}.json", self.base_url);
        self.gateway
            .request(&url, &[("raw_json", "1".to_string())])
            .await
    }

    async fn fetch_more(&self, link_fullname: &str, children: &[String]) -> Option<Value> {
        let url = format!("{}/api/morechildren.json", self.base_url);
        let query = [
            ("api_type", "json".to_string()),
            ("link_id", link_fullname.to_string()),
            ("children", children.join(",")),
            ("raw_json", "1".to_string()),
        ];
        morechildren_things(self.gateway.request(&url, &query).await?)
    }

    async fn fetch_subtree(&self, locator: &str, comment_id: &str) -> Option<Value> {
        let url = format!(
            "{}{}/{comment_id}.json",
            self.base_url,
            locator.trim_end_matches('/')
        );
        self.gateway
            .request(&url, &[("raw_json", "1".to_string())])
            .await
    }
}
