use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ScoredRecord, StoreError, VectorIndex, VectorRecord, cosine_similarity};

const INDEX_FILE: &str = "vectors.json";

/// In-process vector index with exhaustive cosine search.
///
/// Records are kept in insertion order, which doubles as the tie-break for equal scores. When
/// opened on a directory the full record set is rewritten to `vectors.json` after every
/// mutation, through a temporary file and a rename.
pub struct LocalIndex {
    records: RwLock<Vec<VectorRecord>>,
    path: Option<PathBuf>,
}

impl LocalIndex {
    /// Index that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Open (or create) an index persisted under `directory`.
    pub async fn open(directory: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(directory).await?;
        let path = directory.join(INDEX_FILE);
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<VectorRecord>>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "Opened local vector index"
        );
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    async fn persist(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(records)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, path).await?;
        tracing::debug!(path = %path.display(), records = records.len(), "Persisted local index");
        Ok(())
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn ids(&self) -> Result<HashSet<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().map(|record| record.id.clone()).collect())
    }

    async fn upsert(&self, batch: Vec<VectorRecord>) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let dimension = records
            .first()
            .or_else(|| batch.first())
            .map(|record| record.vector.len());

        let mut seen: HashSet<String> = records.iter().map(|record| record.id.clone()).collect();
        let mut next = records.clone();
        let mut inserted = 0;
        for record in batch {
            if let Some(expected) = dimension {
                check_dimension(expected, &record.vector)?;
            }
            if seen.insert(record.id.clone()) {
                next.push(record);
                inserted += 1;
            } else {
                tracing::debug!(id = %record.id, "Skipping record already present");
            }
        }

        if inserted > 0 {
            self.persist(&next).await?;
            *records = next;
        }
        Ok(inserted)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut records = self.records.write().await;
        let next: Vec<VectorRecord> = records
            .iter()
            .filter(|record| !targets.contains(record.id.as_str()))
            .cloned()
            .collect();
        let removed = records.len() - next.len();
        if removed > 0 {
            self.persist(&next).await?;
            *records = next;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let records = self.records.read().await;
        if let Some(first) = records.first() {
            check_dimension(first.vector.len(), vector)?;
        }

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                score: cosine_similarity(&record.vector, vector),
                content: record.content.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}
