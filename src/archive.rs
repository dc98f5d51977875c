//! Merge posts with their comments and persist them as size-bounded JSON
//! chunks plus a manifest.
//!
//! Each chunk is a compact JSON array of combined records. A chunk is flushed
//! once the serialized size of the records appended to it reaches the
//! configured threshold, so every chunk but the last is at least that large,
//! and no chunk is ever empty.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::models::{CombinedRecord, CommentsByPost, Manifest, Post};

/// Attach each post's comment forest, defaulting to none. Post order is kept.
#[must_use]
pub fn combine_posts_comments(posts: Vec<Post>, mut comments: CommentsByPost) -> Vec<CombinedRecord> {
    posts
        .into_iter()
        .map(|post| {
            let forest = comments.remove(&post.id).unwrap_or_default();
            CombinedRecord {
                post,
                comments: forest,
            }
        })
        .collect()
}

/// Path of the manifest written for `base_name` inside `dest`.
#[must_use]
pub fn manifest_path(dest: &Path, base_name: &str) -> PathBuf {
    dest.join(format!("{base_name}_master.json"))
}

#[must_use]
pub fn chunk_file_name(base_name: &str, index: usize) -> String {
    format!("{base_name}_{index:03}.json")
}

/// An in-progress chunk: the open JSON array and the record bytes it holds.
struct ChunkBuffer {
    bytes: Vec<u8>,
    records: usize,
    size: u64,
}

impl ChunkBuffer {
    fn new() -> Self {
        Self {
            bytes: vec![b'['],
            records: 0,
            size: 0,
        }
    }

    fn push(&mut self, record: &[u8]) {
        if self.records > 0 {
            self.bytes.push(b',');
        }
        self.bytes.extend_from_slice(record);
        self.records += 1;
        self.size += record.len() as u64;
    }

    fn finish(mut self) -> Vec<u8> {
        self.bytes.push(b']');
        self.bytes
    }
}

/// Writes combined records as numbered chunk files and a manifest.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    config: ArchiveConfig,
}

impl ArchiveWriter {
    #[must_use]
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Write `records` into `dest` as `{base_name}_001.json`, `_002.json`, ...
    /// followed by `{base_name}_master.json`.
    ///
    /// Chunk numbering starts at 1 on every call; existing files with the same
    /// names are replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be serialized or a file cannot be
    /// written.
    pub async fn write(
        &self,
        records: &[CombinedRecord],
        dest: &Path,
        base_name: &str,
    ) -> Result<Manifest> {
        fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create output directory {}", dest.display()))?;

        let threshold = self.config.chunk_threshold_bytes;
        let mut chunks: Vec<String> = Vec::new();
        let mut current = ChunkBuffer::new();

        for record in records {
            let bytes = serde_json::to_vec(record)
                .with_context(|| format!("Failed to serialize post {}", record.post.id))?;
            current.push(&bytes);

            if current.size >= threshold {
                let full = std::mem::replace(&mut current, ChunkBuffer::new());
                chunks.push(self.flush(full, dest, base_name, chunks.len() + 1).await?);
            }
        }

        if current.records > 0 {
            chunks.push(self.flush(current, dest, base_name, chunks.len() + 1).await?);
        }

        let manifest = Manifest {
            name: base_name.to_string(),
            chunks,
        };
        let path = manifest_path(dest, base_name);
        let body = serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;
        write_atomic(&path, &body).await?;

        info!(
            path = %path.display(),
            chunks = manifest.chunks.len(),
            records = records.len(),
            "Wrote archive manifest"
        );
        Ok(manifest)
    }

    async fn flush(
        &self,
        chunk: ChunkBuffer,
        dest: &Path,
        base_name: &str,
        index: usize,
    ) -> Result<String> {
        let name = chunk_file_name(base_name, index);
        let records = chunk.records;
        let size = chunk.size;
        write_atomic(&dest.join(&name), &chunk.finish()).await?;

        info!(
            chunk = %name,
            records,
            bytes = size,
            threshold = self.config.chunk_threshold_bytes,
            "Saved chunk"
        );
        Ok(name)
    }
}

/// Write `body` to a `.partial` sibling and rename it over `path`.
async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    fs::write(&partial, body)
        .await
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    fs::rename(&partial, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;

    debug!(path = %path.display(), bytes = body.len(), "File written");
    Ok(())
}
