//! Subreddit harvester library.
//!
//! Crawls a subreddit's posts newest-first down to a start year, rebuilds each
//! post's comment tree, and archives the merged records as size-bounded JSON
//! chunks with a manifest.

pub mod archive;
pub mod comments;
pub mod config;
pub mod constants;
pub mod crawler;
pub mod gateway;
pub mod harvest;
pub mod models;
pub mod pacing;
pub mod source;
