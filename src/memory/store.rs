//! Bounded episodic memory
//!
//! Append-only store of (embedding, category) associations backed by a
//! capacity-limited ring buffer. When full, the oldest record is evicted.
//! An optional age limit prunes stale records on every `learn`.
//!
//! Recall scans run under a read lock, so each scan observes a consistent
//! snapshot; an in-progress append is never visible half-written.

use super::index::{build_index, RecallIndex};
use super::record::{MemoryRecord, Recall};
use crate::config::{MemoryConfig, MAX_RETENTION_SECS};
use crate::error::{Error, Result};
use crate::vector::{self, Vector};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Episodic recall memory
pub struct Memory {
    inner: Arc<RwLock<MemoryInner>>,
    dimension: usize,
}

struct MemoryInner {
    /// Insertion order: front = oldest
    ring: VecDeque<Arc<MemoryRecord>>,
    index: Box<dyn RecallIndex>,
    capacity: usize,
    max_age: Option<Duration>,
    next_seq: u64,
}

impl MemoryInner {
    fn evict_front(&mut self) -> Option<Arc<MemoryRecord>> {
        let record = self.ring.pop_front()?;
        self.index.evict(record.seq);
        Some(record)
    }

    /// Drop records at or before `now - max_age`. An age reaching past the
    /// earliest representable time prunes nothing.
    fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = self.max_age.and_then(|age| now.checked_sub_signed(age)) else {
            return 0;
        };
        let mut pruned = 0;
        while self
            .ring
            .front()
            .map(|r| r.created_at <= cutoff)
            .unwrap_or(false)
        {
            self.evict_front();
            pruned += 1;
        }
        pruned
    }
}

impl Memory {
    /// Create a memory with the configured capacity, retention and index.
    pub fn new(config: &MemoryConfig, dimension: usize) -> Self {
        let index = build_index(config, dimension);
        Self::with_index(config, dimension, index)
    }

    /// Create a memory with a caller-supplied recall index.
    pub fn with_index(config: &MemoryConfig, dimension: usize, index: Box<dyn RecallIndex>) -> Self {
        tracing::debug!(
            "Memory: capacity {}, index '{}', dimension {}",
            config.capacity,
            index.name(),
            dimension
        );
        Self {
            inner: Arc::new(RwLock::new(MemoryInner {
                ring: VecDeque::with_capacity(config.capacity.min(1024)),
                index,
                capacity: config.capacity.max(1),
                max_age: config
                    .max_age_secs
                    .map(|s| Duration::seconds(s.min(MAX_RETENTION_SECS) as i64)),
                next_seq: 0,
            })),
            dimension,
        }
    }

    /// Append an association. Duplicates are stored as separate records.
    ///
    /// Returns the new record's sequence number. Only malformed embeddings
    /// (wrong dimension, empty, non-finite) are rejected.
    pub async fn learn(&self, embedding: Vector, category: &str, now: DateTime<Utc>) -> Result<u64> {
        vector::validate(&embedding, self.dimension)?;

        let mut inner = self.inner.write().await;
        let pruned = inner.prune_expired(now);
        if pruned > 0 {
            tracing::debug!("Memory: pruned {} expired records", pruned);
        }
        while inner.ring.len() >= inner.capacity {
            inner.evict_front();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let record = Arc::new(MemoryRecord {
            seq,
            embedding,
            category: category.to_string(),
            created_at: now,
        });
        inner.ring.push_back(record.clone());
        inner.index.insert(record);

        tracing::debug!("Memory learned #{} -> '{}'", seq, category);
        Ok(seq)
    }

    /// Best stored association whose similarity is at least `threshold`.
    pub async fn recall(&self, embedding: &[f32], threshold: f64) -> Result<Option<Recall>> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        let inner = self.inner.read().await;
        let best = inner.index.nearest(embedding)?;
        Ok(best.and_then(|(record, similarity)| {
            if similarity >= threshold {
                tracing::debug!(
                    "Memory recall: '{}' (score: {:.3})",
                    record.category,
                    similarity
                );
                Some(Recall {
                    category: record.category.clone(),
                    similarity,
                    seq: record.seq,
                })
            } else {
                None
            }
        }))
    }

    /// Drop records older than the configured age limit.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        self.inner.write().await.prune_expired(now)
    }

    /// Number of records per category.
    pub async fn category_counts(&self) -> BTreeMap<String, usize> {
        let inner = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for record in &inner.ring {
            *counts.entry(record.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Copy of all records, oldest first.
    pub async fn snapshot(&self) -> Vec<MemoryRecord> {
        self.inner
            .read()
            .await
            .ring
            .iter()
            .map(|r| r.as_ref().clone())
            .collect()
    }

    /// Replace the contents with previously snapshotted records.
    ///
    /// Records of the wrong dimension are skipped. When more records than
    /// the capacity are supplied, the newest are kept.
    pub async fn restore(&self, mut records: Vec<MemoryRecord>) -> usize {
        records.sort_by_key(|r| r.seq);
        let mut inner = self.inner.write().await;
        inner.ring.clear();
        inner.index.clear();

        let before = records.len();
        records.retain(|r| r.embedding.len() == self.dimension);
        if records.len() < before {
            tracing::info!(
                "Memory: skipped {} records with mismatched dimension",
                before - records.len()
            );
        }
        let skip = records.len().saturating_sub(inner.capacity);
        let mut next_seq = 0;
        for record in records.into_iter().skip(skip) {
            next_seq = next_seq.max(record.seq + 1);
            let record = Arc::new(record);
            inner.ring.push_back(record.clone());
            inner.index.insert(record);
        }
        inner.next_seq = next_seq;
        inner.ring.len()
    }

    /// Get the current number of records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.ring.len()
    }

    /// Check if the memory is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.ring.is_empty()
    }

    /// Embedding dimension accepted by this memory.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexKind;

    fn memory(capacity: usize) -> Memory {
        Memory::new(
            &MemoryConfig {
                capacity,
                ..Default::default()
            },
            3,
        )
    }

    #[tokio::test]
    async fn test_learn_and_recall() {
        let mem = memory(10);
        let now = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "Academic", now).await.unwrap();

        let hit = mem.recall(&[0.95, 0.05, 0.0], 0.75).await.unwrap().unwrap();
        assert_eq!(hit.category, "Academic");
        assert!(hit.similarity >= 0.75);
    }

    #[tokio::test]
    async fn test_recall_below_threshold() {
        let mem = memory(10);
        mem.learn(vec![1.0, 0.0, 0.0], "Academic", Utc::now())
            .await
            .unwrap();
        assert!(mem.recall(&[0.0, 1.0, 0.0], 0.75).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recall_threshold_inclusive() {
        let mem = memory(10);
        mem.learn(vec![1.0, 0.0, 0.0], "Code", Utc::now()).await.unwrap();
        let hit = mem.recall(&[1.0, 0.0, 0.0], 1.0).await.unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_duplicates_stored_separately() {
        let mem = memory(10);
        let now = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "Code", now).await.unwrap();
        mem.learn(vec![1.0, 0.0, 0.0], "Code", now).await.unwrap();
        assert_eq!(mem.len().await, 2);
    }

    #[tokio::test]
    async fn test_equal_similarity_prefers_most_recent() {
        let mem = memory(10);
        let now = Utc::now();
        mem.learn(vec![0.0, 1.0, 0.0], "Personal", now).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "Finance", now + Duration::seconds(5))
            .await
            .unwrap();

        let hit = mem.recall(&[0.0, 1.0, 0.0], 0.5).await.unwrap().unwrap();
        assert_eq!(hit.category, "Finance");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let mem = memory(2);
        let now = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "First", now).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "Second", now).await.unwrap();
        mem.learn(vec![0.0, 0.0, 1.0], "Third", now).await.unwrap();

        assert_eq!(mem.len().await, 2);
        let hit = mem.recall(&[1.0, 0.0, 0.0], 0.9).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_age_retention() {
        let mem = Memory::new(
            &MemoryConfig {
                max_age_secs: Some(60),
                ..Default::default()
            },
            3,
        );
        let t = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "Old", t).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "New", t + Duration::seconds(90))
            .await
            .unwrap();

        assert_eq!(mem.len().await, 1);
        assert_eq!(mem.prune(t + Duration::seconds(200)).await, 1);
        assert!(mem.is_empty().await);
    }

    #[tokio::test]
    async fn test_age_past_earliest_time_prunes_nothing() {
        let mem = Memory::new(
            &MemoryConfig {
                max_age_secs: Some(u64::MAX),
                ..Default::default()
            },
            3,
        );
        let earliest = DateTime::<Utc>::MIN_UTC;
        mem.learn(vec![1.0, 0.0, 0.0], "Ancient", earliest).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "Old", earliest + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(mem.prune(earliest + Duration::seconds(2)).await, 0);
        assert_eq!(mem.len().await, 2);

        // The age is clamped, so a present-day clock still prunes
        assert_eq!(mem.prune(Utc::now()).await, 2);
    }

    #[tokio::test]
    async fn test_learn_rejects_wrong_dimension() {
        let mem = memory(10);
        let err = mem.learn(vec![1.0, 0.0], "Code", Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert!(mem.recall(&[1.0], 0.5).await.is_err());
    }

    #[tokio::test]
    async fn test_category_counts() {
        let mem = memory(10);
        let now = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "Code", now).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "Code", now).await.unwrap();
        mem.learn(vec![0.0, 0.0, 1.0], "Finance", now).await.unwrap();

        let counts = mem.category_counts().await;
        assert_eq!(counts.get("Code"), Some(&2));
        assert_eq!(counts.get("Finance"), Some(&1));
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let mem = memory(10);
        let now = Utc::now();
        mem.learn(vec![1.0, 0.0, 0.0], "Code", now).await.unwrap();
        mem.learn(vec![0.0, 1.0, 0.0], "Finance", now).await.unwrap();
        let snapshot = mem.snapshot().await;

        let other = memory(10);
        assert_eq!(other.restore(snapshot).await, 2);
        let hit = other.recall(&[0.0, 1.0, 0.0], 0.9).await.unwrap().unwrap();
        assert_eq!(hit.category, "Finance");

        // Sequence numbers continue after the restored records
        let seq = other.learn(vec![0.0, 0.0, 1.0], "Images", now).await.unwrap();
        assert_eq!(seq, 2);
    }

    #[tokio::test]
    async fn test_restore_keeps_newest_within_capacity() {
        let source = memory(10);
        let now = Utc::now();
        for i in 0..5 {
            source
                .learn(vec![1.0, i as f32, 0.0], &format!("C{}", i), now)
                .await
                .unwrap();
        }
        let target = memory(2);
        assert_eq!(target.restore(source.snapshot().await).await, 2);
        let counts = target.category_counts().await;
        assert!(counts.contains_key("C3") && counts.contains_key("C4"));
    }

    #[tokio::test]
    async fn test_lsh_backed_memory_recalls_exact() {
        let mem = Memory::new(
            &MemoryConfig {
                index: IndexKind::Lsh,
                lsh_planes: 6,
                ..Default::default()
            },
            3,
        );
        mem.learn(vec![0.2, 0.9, -0.1], "Academic", Utc::now())
            .await
            .unwrap();
        let hit = mem.recall(&[0.2, 0.9, -0.1], 0.75).await.unwrap().unwrap();
        assert_eq!(hit.category, "Academic");
    }

    #[tokio::test]
    async fn test_concurrent_learn_and_recall() {
        let mem = Arc::new(memory(1000));
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..8 {
            let mem = mem.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25 {
                    let v = vec![1.0, (i * 25 + j) as f32 * 0.01, 0.0];
                    mem.learn(v, "Code", now).await.unwrap();
                    mem.recall(&[1.0, 0.0, 0.0], 0.5).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(mem.len().await, 200);
        let snapshot = mem.snapshot().await;
        let mut seqs: Vec<u64> = snapshot.iter().map(|r| r.seq).collect();
        seqs.dedup();
        assert_eq!(seqs.len(), 200);
    }
}
