//! Shared constants used across the application.

/// Author recorded when a post or comment has no author (deleted account).
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Desktop browser user agents rotated across requests to public endpoints.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
];

/// Default user agent for the authenticated API, which requires a descriptive one.
pub const DEFAULT_API_USER_AGENT: &str = "script:subreddit-harvester:v0.1";

/// Upstream listings stop paginating after roughly this many items.
pub const LISTING_DEPTH_CEILING: usize = 1000;

/// The morechildren endpoint accepts at most this many ids per request.
pub const MORECHILDREN_BATCH: usize = 100;
