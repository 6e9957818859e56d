use std::path::Path;

use thiserror::Error;

use crate::db::operations::vocabulary;
use crate::db::Database;
use crate::models::VocabularyItem;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid vocabulary file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Loads a JSON array of vocabulary items into the store. Existing ids are
/// overwritten with the file's content; review states are never touched.
pub async fn seed_vocabulary_from_file(db: &Database, path: &Path) -> Result<usize, SeedError> {
    let raw = tokio::fs::read(path).await.map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let items: Vec<VocabularyItem> = serde_json::from_slice(&raw)?;
    seed_vocabulary(db, &items).await
}

pub async fn seed_vocabulary(db: &Database, items: &[VocabularyItem]) -> Result<usize, SeedError> {
    let mut written = 0usize;
    for item in items {
        if item.id.trim().is_empty() || item.target_text.trim().is_empty() {
            tracing::warn!(id = %item.id, "skipping vocabulary entry without id or text");
            continue;
        }
        vocabulary::upsert_vocabulary(db, item).await?;
        written += 1;
    }
    tracing::info!(count = written, "vocabulary seeded");
    Ok(written)
}
