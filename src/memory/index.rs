//! Pluggable nearest-neighbor strategies behind the recall contract
//!
//! ```text
//! learn ──► ring buffer (ordering, eviction) ──► RecallIndex::insert
//! recall ─────────────────────────────────────► RecallIndex::nearest
//! ```
//!
//! `LinearIndex` is exact and is the right choice up to a few thousand
//! records. `LshIndex` trades exactness for sub-linear probing once the
//! store grows past that.

use super::record::MemoryRecord;
use crate::config::{IndexKind, MemoryConfig};
use crate::error::Result;
use crate::vector::{self, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Nearest-neighbor index over memory records.
///
/// Implementations are driven under the memory's lock, so they need not be
/// internally synchronized.
pub trait RecallIndex: Send + Sync {
    /// Add a record.
    fn insert(&mut self, record: Arc<MemoryRecord>);

    /// Remove the record with the given sequence number.
    fn evict(&mut self, seq: u64);

    /// Best match by cosine similarity; exact ties go to the newer record.
    fn nearest(&self, query: &[f32]) -> Result<Option<(Arc<MemoryRecord>, f64)>>;

    /// Drop every record.
    fn clear(&mut self);

    /// Human-readable strategy name (used in logs).
    fn name(&self) -> &str;
}

/// Build the index selected by configuration.
pub fn build_index(config: &MemoryConfig, dimension: usize) -> Box<dyn RecallIndex> {
    match config.index {
        IndexKind::Linear => Box::new(LinearIndex::new()),
        IndexKind::Lsh => Box::new(LshIndex::new(dimension, config.lsh_planes, config.lsh_seed)),
    }
}

fn pick_best<'a, I>(query: &[f32], records: I) -> Result<Option<(Arc<MemoryRecord>, f64)>>
where
    I: IntoIterator<Item = &'a Arc<MemoryRecord>>,
{
    let mut best: Option<(Arc<MemoryRecord>, f64)> = None;
    for record in records {
        let sim = vector::cosine_similarity(query, &record.embedding)?;
        let better = match &best {
            None => true,
            Some((current, best_sim)) => {
                sim > *best_sim || (sim == *best_sim && record.is_newer_than(current))
            }
        };
        if better {
            best = Some((record.clone(), sim));
        }
    }
    Ok(best)
}

/// Exact linear scan.
#[derive(Default)]
pub struct LinearIndex {
    records: VecDeque<Arc<MemoryRecord>>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecallIndex for LinearIndex {
    fn insert(&mut self, record: Arc<MemoryRecord>) {
        self.records.push_back(record);
    }

    fn evict(&mut self, seq: u64) {
        // Eviction is oldest-first, so the front is the common case
        if self.records.front().map(|r| r.seq) == Some(seq) {
            self.records.pop_front();
        } else {
            self.records.retain(|r| r.seq != seq);
        }
    }

    fn nearest(&self, query: &[f32]) -> Result<Option<(Arc<MemoryRecord>, f64)>> {
        pick_best(query, self.records.iter())
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// Random-hyperplane locality-sensitive hashing.
///
/// Each record is bucketed by the sign of its projection onto `planes`
/// random hyperplanes. A query probes its own bucket plus every bucket at
/// Hamming distance one. Results are approximate: a true nearest neighbor
/// that lands two or more bits away is missed.
pub struct LshIndex {
    planes: Vec<Vector>,
    buckets: HashMap<u32, Vec<Arc<MemoryRecord>>>,
    locations: HashMap<u64, u32>,
}

impl LshIndex {
    pub fn new(dimension: usize, planes: usize, seed: u64) -> Self {
        let planes = planes.clamp(1, 32);
        let mut rng = StdRng::seed_from_u64(seed);
        let planes = (0..planes)
            .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect();
        Self {
            planes,
            buckets: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    fn signature(&self, v: &[f32]) -> Result<u32> {
        let mut sig = 0u32;
        for (bit, plane) in self.planes.iter().enumerate() {
            if vector::dot(plane, v)? >= 0.0 {
                sig |= 1 << bit;
            }
        }
        Ok(sig)
    }

    /// Number of occupied buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RecallIndex for LshIndex {
    fn insert(&mut self, record: Arc<MemoryRecord>) {
        let sig = match self.signature(&record.embedding) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::warn!("LSH index rejected record {}: {}", record.seq, e);
                return;
            }
        };
        self.locations.insert(record.seq, sig);
        self.buckets.entry(sig).or_default().push(record);
    }

    fn evict(&mut self, seq: u64) {
        if let Some(sig) = self.locations.remove(&seq) {
            if let Some(bucket) = self.buckets.get_mut(&sig) {
                bucket.retain(|r| r.seq != seq);
                if bucket.is_empty() {
                    self.buckets.remove(&sig);
                }
            }
        }
    }

    fn nearest(&self, query: &[f32]) -> Result<Option<(Arc<MemoryRecord>, f64)>> {
        let sig = self.signature(query)?;
        let probes = std::iter::once(sig).chain((0..self.planes.len()).map(|bit| sig ^ (1 << bit)));
        let candidates = probes
            .filter_map(|probe| self.buckets.get(&probe))
            .flat_map(|bucket| bucket.iter());
        pick_best(query, candidates)
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.locations.clear();
    }

    fn name(&self) -> &str {
        "lsh"
    }
}
