pub mod batch;
pub mod fetcher;
pub mod tree;

pub use batch::BatchOrchestrator;
pub use fetcher::CommentTreeFetcher;
pub use tree::{BuiltForest, CommentArena, Placeholder};
