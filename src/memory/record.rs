//! Episodic memory record

use crate::vector::Vector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learned (embedding, category) association. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Monotonic insertion sequence number
    pub seq: u64,
    pub embedding: Vector,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Whether `self` was learned after `other`.
    ///
    /// Used to break exact similarity ties in favor of the most recent
    /// association.
    pub fn is_newer_than(&self, other: &MemoryRecord) -> bool {
        (self.created_at, self.seq) > (other.created_at, other.seq)
    }
}

/// A successful recall.
#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    pub category: String,
    pub similarity: f64,
    pub seq: u64,
}
